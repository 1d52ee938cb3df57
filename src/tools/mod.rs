// src/tools/mod.rs
// Tool implementations shared by the MCP server and the CLI

pub mod core;

pub use core::ToolContext;
