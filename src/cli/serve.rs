// src/cli/serve.rs
// Server initialization and main loops

use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::{info, warn};
use zotero_mcp::config::EnvConfig;
use zotero_mcp::export::{find_pandoc, resolve_pdf_engine};
use zotero_mcp::mcp::ZoteroServer;
use zotero_mcp::registry::{FileRegistry, SweeperHandle, spawn_sweeper};
use zotero_mcp::tools::core::ToolContext;
use zotero_mcp::web::{self, state::AppState};

/// Load config, create the registry and build the server
pub fn setup_server_context() -> Result<ZoteroServer> {
    // Load configuration once (single source of truth)
    let env_config = EnvConfig::load();

    // Validate and log warnings
    let validation = env_config.validate();
    for warning in &validation.warnings {
        warn!("{}", warning);
    }
    if !validation.is_valid() {
        bail!("{}", validation.report());
    }

    std::fs::create_dir_all(&env_config.files.dir).with_context(|| {
        format!("creating files dir {}", env_config.files.dir.display())
    })?;
    let registry = Arc::new(FileRegistry::from_config(&env_config.files));

    Ok(ZoteroServer::new(Arc::new(env_config), registry))
}

/// One-line summary of what builds will be able to do
fn log_startup_summary(server: &ZoteroServer) {
    let config = server.config();
    let search_path = server.search_path();
    let pandoc = match find_pandoc(&config.export, search_path.as_deref()) {
        Ok(path) => path.display().to_string(),
        Err(_) => "missing".to_string(),
    };
    let (engine, _) = resolve_pdf_engine(&config.export, None, search_path.as_deref());
    info!(
        pandoc = %pandoc,
        pdf_engine = engine.as_ref().map(|e| e.engine.as_str()).unwrap_or("none"),
        inline_max_bytes = config.export.inline_max_bytes,
        file_ttl_secs = config.files.ttl.as_secs(),
        delete_after_download = config.files.delete_after_download,
        public_url = %server.public_base_url(),
        "Export pipeline ready"
    );
}

fn start_sweeper(server: &ZoteroServer) -> SweeperHandle {
    spawn_sweeper(server.registry.clone(), server.config.files.sweep_interval)
}

/// Run the MCP server with stdio transport and the file server alongside
pub async fn run_mcp_server() -> Result<()> {
    let server = setup_server_context()?;
    log_startup_summary(&server);
    let sweeper = start_sweeper(&server);

    // File retrieval runs next to stdio; MCP keeps working if the port is taken
    let addr = server.config.server.bind_addr();
    let app = web::create_files_router(AppState::new(server.clone()));
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!(addr = %addr, "File server listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    warn!(error = %e, "File server stopped");
                }
            });
        }
        Err(e) => warn!(addr = %addr, error = %e, "File server unavailable; large artifacts cannot be downloaded"),
    }

    // Run with stdio transport
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;

    sweeper.shutdown().await;
    Ok(())
}

/// Run MCP over Streamable HTTP with downloads and health on the same router
pub async fn run_http_server() -> Result<()> {
    let server = setup_server_context()?;
    log_startup_summary(&server);
    let sweeper = start_sweeper(&server);

    let addr = server.config.server.bind_addr();
    let app = web::create_router(AppState::new(server));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "MCP Streamable HTTP at /mcp");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    sweeper.shutdown().await;
    Ok(())
}
