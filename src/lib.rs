// src/lib.rs
// zotero-mcp - Zotero bibliography export and document build tools over MCP

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod bibliography;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod http;
pub mod mcp;
pub mod registry;
pub mod tools;
pub mod utils;
pub mod web;
pub mod zotero;

pub use error::{Result, ZoteroMcpError};
