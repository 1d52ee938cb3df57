// src/cli/mod.rs
// CLI module for zotero-mcp commands

use clap::{Parser, Subcommand};

pub mod serve;
pub mod tool;

// Re-export command handlers
pub use serve::{run_http_server, run_mcp_server};
pub use tool::run_tool;

#[derive(Parser)]
#[command(name = "zotero-mcp")]
#[command(about = "MCP server for Zotero: bibliography export, citation validation and document builds")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as MCP server over stdio (default)
    Serve {
        /// Serve MCP over Streamable HTTP at /mcp instead of stdio
        #[arg(long)]
        http: bool,
    },

    /// Execute a tool directly
    Tool {
        /// Tool name (e.g. zotero_health, zotero_build_exports_content)
        #[arg(index = 1)]
        name: String,

        /// JSON arguments (e.g. '{"citekeys": ["doe2020"]}')
        #[arg(index = 2, default_value = "{}")]
        args: String,
    },
}

impl Commands {
    /// Whether stdout carries the MCP protocol
    pub fn is_stdio(&self) -> bool {
        matches!(self, Commands::Serve { http: false })
    }
}
