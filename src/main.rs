//! mcp-bridge CLI binary entry point.

use clap::Parser;
use mcp_bridge::cli::{commands, Cli, Commands};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // stdout carries MCP frames when serving, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::ListServers => commands::handle_list_servers(&config),
        Commands::Info(args) => commands::handle_info(&config, &args.server).await,
        Commands::ListTools(args) => commands::handle_list_tools(&config, &args).await,
        Commands::CallTool(args) => {
            commands::handle_call_tool(&config, &args.server, &args.tool, &args.args).await
        }
        Commands::Serve => commands::handle_serve(&config).await,
    }
}
