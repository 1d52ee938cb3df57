// src/main.rs
// zotero-mcp - Zotero bibliography export and document builds for AI agents

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(config_dir) = dirs::config_dir() {
        let _ = dotenvy::from_path(config_dir.join("zotero-mcp/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve { http: false });

    // Quiet for MCP stdio so logs never mix with protocol output
    let default_level = if command.is_stdio() { Level::WARN } else { Level::INFO };
    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| Level::from_str(v.trim()).ok())
        .unwrap_or(default_level);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match command {
        Commands::Serve { http: false } => cli::run_mcp_server().await?,
        Commands::Serve { http: true } => cli::run_http_server().await?,
        Commands::Tool { name, args } => cli::run_tool(name, args).await?,
    }

    Ok(())
}
