//! Handlers for the mcp-bridge subcommands.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use rmcp::model::Tool;
use tokio_util::sync::CancellationToken;

use crate::config::{BackendConfig, BridgeConfig};
use crate::error::BridgeError;
use crate::mcp::client::{MCPConnector, MCPSession, ToolSession};
use crate::mcp::filter::{filter_tools, ToolFilter};
use crate::mcp::server::MCPSubagentServer;
use crate::mcp::transport::build_transport;
use crate::mcp::MCPToolCallback;
use crate::tools::ToolCallback;
use crate::types::ContentBlock;

use super::executor::CommandExecutor;
use super::ListToolsArgs;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Load the config from `path`, or discover it.
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, BridgeError> {
    match path {
        Some(path) => BridgeConfig::load(path),
        None => BridgeConfig::discover(),
    }
}

fn server_config<'a>(config: &'a BridgeConfig, name: &str) -> Result<&'a BackendConfig, BridgeError> {
    config
        .mcp_servers
        .get(name)
        .ok_or_else(|| BridgeError::Configuration(format!("server '{name}' not found in configuration")))
}

async fn connect(
    name: &str,
    backend: &BackendConfig,
    ct: &CancellationToken,
) -> Result<MCPSession, BridgeError> {
    let transport = build_transport(backend, None).map_err(|e| BridgeError::server(name, e))?;
    MCPConnector::default()
        .connect(transport, backend.timeout(), ct)
        .await
        .map_err(|e| BridgeError::server(name, e))
}

/// Handle `mcp-bridge list-servers`.
pub fn handle_list_servers(config: &BridgeConfig) -> CommandResult {
    print!("{}", render_server_list(&config.mcp_servers));
    Ok(())
}

/// Handle `mcp-bridge info <server>`.
pub async fn handle_info(config: &BridgeConfig, server: &str) -> CommandResult {
    let backend = server_config(config, server)?;
    let ct = CancellationToken::new();
    let session = connect(server, backend, &ct).await?;

    println!("Connected to server: {server}");
    if let Some(info) = session.server_info() {
        println!("Name: {}", info.server_info.name);
        println!("Version: {}", info.server_info.version);
        if let Some(instructions) = &info.instructions {
            println!("Instructions: {instructions}");
        }
    }
    session.close().await?;
    Ok(())
}

/// Handle `mcp-bridge list-tools <server>`.
pub async fn handle_list_tools(config: &BridgeConfig, args: &ListToolsArgs) -> CommandResult {
    let backend = server_config(config, &args.server)?;
    let ct = CancellationToken::new();
    let session = connect(&args.server, backend, &ct).await?;
    let listed = session.list_tools(&ct).await;
    session.close().await?;

    let view = if args.show_all {
        ToolView::All
    } else if args.show_filtered {
        ToolView::Filtered
    } else {
        ToolView::Available
    };
    print!("{}", render_tool_report(&args.server, backend, &listed?, view)?);
    Ok(())
}

/// Handle `mcp-bridge call-tool`.
pub async fn handle_call_tool(
    config: &BridgeConfig,
    server: &str,
    tool: &str,
    arguments: &str,
) -> CommandResult {
    let backend = server_config(config, server)?;
    let ct = CancellationToken::new();
    let session: Arc<dyn ToolSession> = Arc::new(connect(server, backend, &ct).await?);

    let callback = MCPToolCallback::new(server, tool, session.clone());
    let call_id = uuid::Uuid::new_v4().to_string();
    let outcome = callback.call(arguments, &call_id, &ct).await;
    session.close().await?;

    let message = outcome?;
    for block in &message.content {
        match block {
            ContentBlock::Text { text } => println!("{text}"),
            ContentBlock::Image(image) => {
                println!("[image: {}, {} bytes]", image.mime_type, image.data.len())
            }
        }
    }
    if message.is_error {
        return Err(format!("tool call {call_id} failed").into());
    }
    Ok(())
}

/// Handle `mcp-bridge serve`.
pub async fn handle_serve(config: &BridgeConfig) -> CommandResult {
    let subagent = config.subagent.clone().ok_or_else(|| {
        BridgeError::Configuration("serve requires a 'subagent' section in the config".into())
    })?;
    let executor = CommandExecutor::from_config(&subagent)?;
    let server = MCPSubagentServer::builder()
        .config(subagent)
        .executor(Arc::new(executor))
        .build()?;

    let ct = CancellationToken::new();
    let shutdown = ct.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    tracing::info!(tool = %server.tool().name, "serving subagent on stdio");
    server.serve_stdio(ct).await?;
    Ok(())
}

/// Human-readable list of configured servers.
pub fn render_server_list(servers: &BTreeMap<String, BackendConfig>) -> String {
    let mut out = String::new();
    if servers.is_empty() {
        out.push_str("No MCP servers configured.\n");
        return out;
    }
    for (name, server) in servers {
        let _ = writeln!(
            out,
            "- {name} (Type: {}, Timeout: {}s)",
            server.kind,
            server.timeout().as_secs()
        );
        if let Some(command) = &server.command {
            let _ = writeln!(out, "  Command: {command} {}", server.args.join(" "));
        }
        if let Some(url) = &server.url {
            let _ = writeln!(out, "  URL: {url}");
        }
        if !server.env.is_empty() {
            let _ = writeln!(out, "  Environment:");
            for (key, value) in &server.env {
                let _ = writeln!(out, "    {key}={value}");
            }
        }
    }
    out
}

/// Which tools a `list-tools` report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolView {
    Available,
    All,
    Filtered,
}

/// Markdown report of a server's tools and its filter.
pub fn render_tool_report(
    server: &str,
    backend: &BackendConfig,
    tools: &[Tool],
    view: ToolView,
) -> Result<String, BridgeError> {
    let filter = ToolFilter::from_config(backend);
    let outcome = filter_tools(tools.iter().collect::<Vec<_>>(), &filter);

    let (title, shown): (String, Vec<&Tool>) = match view {
        ToolView::All => (
            format!("All tools on server '{server}' (including filtered)"),
            tools.iter().collect(),
        ),
        ToolView::Filtered => (
            format!("Filtered-out tools on server '{server}'"),
            tools
                .iter()
                .filter(|t| outcome.excluded.iter().any(|name| name.as_str() == &*t.name))
                .collect(),
        ),
        ToolView::Available => (
            format!("Available tools on server '{server}'"),
            outcome.retained.clone(),
        ),
    };

    let mut out = String::new();
    let _ = write!(out, "# {title}\n\n**Filter mode:** `{}`", filter.mode());
    if let Some(enabled) = backend.enabled_tools.as_ref().filter(|l| !l.is_empty()) {
        let _ = write!(out, " | **Enabled tools:** `{}`", enabled.join("`, `"));
    }
    if let Some(disabled) = backend.disabled_tools.as_ref().filter(|l| !l.is_empty()) {
        let _ = write!(out, " | **Disabled tools:** `{}`", disabled.join("`, `"));
    }
    let _ = write!(
        out,
        "\n**Total tools:** {} | **Available:** {} | **Filtered out:** {}\n\n",
        tools.len(),
        outcome.retained.len(),
        outcome.excluded.len()
    );

    if shown.is_empty() {
        out.push_str("*No tools to display.*\n");
        return Ok(out);
    }

    for tool in shown {
        let badge = if view == ToolView::All && !filter.permits(&tool.name) {
            " 🚫 *filtered*"
        } else {
            ""
        };
        let _ = write!(
            out,
            "### `{}`{badge}\n{}\n\n",
            tool.name,
            tool.description.as_deref().unwrap_or_default()
        );
        let _ = write!(
            out,
            "**Input Schema:**\n\n```json\n{}\n```\n\n",
            serde_json::to_string_pretty(&*tool.input_schema)?
        );
        if let Some(output_schema) = &tool.output_schema {
            let _ = write!(
                out,
                "**Output Schema:**\n\n```json\n{}\n```\n\n",
                serde_json::to_string_pretty(&**output_schema)?
            );
        }
    }
    Ok(out)
}
