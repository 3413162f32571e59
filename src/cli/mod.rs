//! CLI entry point for mcp-bridge.

pub mod commands;
pub mod executor;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect MCP backends, call their tools, or serve a subagent over MCP.
#[derive(Parser, Debug)]
#[command(name = "mcp-bridge", version, about = "MCP bridge CLI")]
pub struct Cli {
    /// Config file (.json or .toml); discovered in the current or home directory when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured MCP servers
    ListServers,
    /// Connect to a server and show its identity
    Info(InfoArgs),
    /// List a server's tools and how its filter applies
    ListTools(ListToolsArgs),
    /// Call one tool on a server
    CallTool(CallToolArgs),
    /// Serve the configured subagent over MCP on stdio
    Serve,
}

/// Arguments for `info`.
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Server name from the config
    pub server: String,
}

/// Arguments for `list-tools`.
#[derive(Parser, Debug)]
pub struct ListToolsArgs {
    /// Server name from the config
    pub server: String,

    /// Show every tool, marking the filtered ones
    #[arg(long, conflicts_with = "show_filtered")]
    pub show_all: bool,

    /// Show only the tools the filter removes
    #[arg(long)]
    pub show_filtered: bool,
}

/// Arguments for `call-tool`.
#[derive(Parser, Debug)]
pub struct CallToolArgs {
    /// Server name from the config
    #[arg(long)]
    pub server: String,

    /// Tool name
    #[arg(long)]
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub args: String,
}
