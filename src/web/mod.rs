// src/web/mod.rs
// HTTP layer: artifact downloads, health and MCP over Streamable HTTP

pub mod files;
pub mod mcp_http;
pub mod state;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn base_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/files/{token}", get(files::download))
}

/// Router for the side file server that runs next to stdio MCP
pub fn create_files_router(state: AppState) -> Router {
    base_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the web server router (downloads, health and `/mcp`)
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // MCP over HTTP service
    let mcp_service = mcp_http::create_mcp_service(state.clone());

    base_router()
        // MCP over HTTP (Streamable HTTP transport)
        .nest_service("/mcp", mcp_service)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvConfig, FilesConfig};
    use crate::mcp::ZoteroServer;
    use crate::registry::FileRegistry;
    use crate::zotero::StyleFetcher;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: AppState,
    }

    fn fixture(delete_after_download: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EnvConfig::default();
        config.files = FilesConfig {
            dir: dir.path().join("files"),
            ttl: Duration::from_secs(3600),
            delete_after_download,
            ..FilesConfig::default()
        };
        let registry = Arc::new(FileRegistry::from_config(&config.files));
        let styles = Arc::new(StyleFetcher::new(reqwest::Client::new(), Duration::from_secs(60), 10));
        let server = ZoteroServer::with_parts(Arc::new(config), registry, None, styles);
        Fixture {
            _dir: dir,
            state: AppState::new(server),
        }
    }

    fn register(state: &AppState, name: &str, bytes: &[u8]) -> String {
        let root = state.registry().root().to_path_buf();
        std::fs::create_dir_all(&root).unwrap();
        let path = root.join(name);
        std::fs::write(&path, bytes).unwrap();
        state
            .registry()
            .register(path, name, bytes.len() as u64, "docx")
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    #[tokio::test]
    async fn test_download_streams_file_with_headers() {
        let fx = fixture(false);
        let token = register(&fx.state, "report.docx", b"docx-bytes");

        let (status, headers, body) =
            get(create_files_router(fx.state.clone()), &format!("/files/{}", token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"docx-bytes");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"report.docx\""
        );
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert!(fx.state.registry().get(&token).unwrap().downloaded);

        // repeatable when one-time downloads are off
        let (again, _, _) = get(create_files_router(fx.state.clone()), &format!("/files/{}", token)).await;
        assert_eq!(again, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_token_is_404_with_payload() {
        let fx = fixture(false);
        let (status, _, body) = get(create_files_router(fx.state), "/files/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let payload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["errorCode"], "TOKEN_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_removed_file_is_410() {
        let fx = fixture(false);
        let token = register(&fx.state, "gone.pdf", b"%PDF");
        std::fs::remove_file(fx.state.registry().root().join("gone.pdf")).unwrap();

        let (status, _, _) = get(create_files_router(fx.state.clone()), &format!("/files/{}", token)).await;
        assert_eq!(status, StatusCode::GONE);
        let (status, _, _) = get(create_files_router(fx.state), &format!("/files/{}", token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_one_time_download() {
        let fx = fixture(true);
        let token = register(&fx.state, "once.pdf", b"%PDF-1.7");

        let (first, _, body) = get(create_files_router(fx.state.clone()), &format!("/files/{}", token)).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(body, b"%PDF-1.7");

        let (second, _, _) = get(create_files_router(fx.state.clone()), &format!("/files/{}", token)).await;
        assert_eq!(second, StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_one_time_download_served_once_under_concurrency() {
        let fx = fixture(true);
        let token = register(&fx.state, "race.pdf", b"%PDF-1.7");
        let uri = format!("/files/{}", token);

        let (a, b) = tokio::join!(
            get(create_files_router(fx.state.clone()), &uri),
            get(create_files_router(fx.state.clone()), &uri)
        );
        let mut statuses = vec![a.0, b.0];
        statuses.sort();
        assert_eq!(statuses, vec![StatusCode::OK, StatusCode::GONE]);
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture(false);
        let (status, _, body) = get(create_router(fx.state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }
}
