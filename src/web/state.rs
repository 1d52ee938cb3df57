// src/web/state.rs
// Web server state management

use crate::config::EnvConfig;
use crate::mcp::ZoteroServer;
use crate::registry::FileRegistry;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// MCP server; a fresh clone backs each Streamable HTTP session
    pub server: ZoteroServer,
}

impl AppState {
    pub fn new(server: ZoteroServer) -> Self {
        Self { server }
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.server.registry
    }

    pub fn config(&self) -> &EnvConfig {
        &self.server.config
    }
}
