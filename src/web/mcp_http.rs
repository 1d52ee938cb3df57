// src/web/mcp_http.rs
// MCP over HTTP (Streamable HTTP transport)

use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;

use crate::mcp::ZoteroServer;
use crate::web::state::AppState;

/// Create the MCP HTTP service
pub fn create_mcp_service(state: AppState) -> StreamableHttpService<ZoteroServer, LocalSessionManager> {
    // Sessions share the registry and caches through the server's Arcs
    let server = state.server;
    let service_factory = move || Ok(server.clone());

    let session_manager = Arc::new(LocalSessionManager::default());

    let config = StreamableHttpServerConfig {
        sse_keep_alive: Some(Duration::from_secs(15)),
        stateful_mode: true,
        ..Default::default()
    };

    StreamableHttpService::new(service_factory, session_manager, config)
}
