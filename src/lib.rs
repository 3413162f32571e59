//! mcp-bridge: make MCP servers' tools callable by an agent, and expose an
//! agent as an MCP server.
//!
//! Backends are declared in a [`config::BridgeConfig`]. The
//! [`mcp::MCPOrchestrator`] connects to each one, applies its tool filter,
//! translates the tool schemas and hands back one [`tools::ToolCallback`] per
//! tool. [`mcp::MCPSubagentServer`] goes the other way and serves a single
//! subagent tool over MCP.
//!
//! ```no_run
//! use mcp_bridge::config::BridgeConfig;
//! use mcp_bridge::mcp::MCPOrchestrator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mcp_bridge::error::Result<()> {
//! let config = BridgeConfig::load(".mcpbridge.json")?;
//! let state = MCPOrchestrator::default()
//!     .connect_all(&config.mcp_servers, &CancellationToken::new())
//!     .await?;
//! println!("{} tools available", state.tool_count());
//! state.close_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
