// src/web/files.rs
// Token-based retrieval of built artifacts

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::ZoteroMcpError;
use crate::utils::token_prefix;
use crate::web::state::AppState;

/// Time a one-time download keeps its file on disk after the response starts
pub const DELETE_GRACE: Duration = Duration::from_secs(5);

fn error_response(err: &ZoteroMcpError) -> Response {
    let status = match err {
        ZoteroMcpError::TokenNotFound => StatusCode::NOT_FOUND,
        ZoteroMcpError::TokenGone => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err.payload())).into_response()
}

fn content_disposition(filename: &str) -> String {
    let escaped: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", escaped)
}

/// GET /files/{token}
pub async fn download(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    let registry = state.registry();
    let one_time = state.config().files.delete_after_download;

    // one-time entries are claimed before the file is opened
    let found = if one_time {
        registry.claim_download(&token)
    } else {
        registry.lookup(&token)
    };
    let entry = match found {
        Ok(entry) => entry,
        Err(e) => {
            info!(token = token_prefix(&token), error = %e, "Download refused");
            return error_response(&e);
        }
    };

    let file = match tokio::fs::File::open(&entry.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            registry.cleanup(&token);
            return error_response(&ZoteroMcpError::TokenGone);
        }
        Err(e) => {
            warn!(token = token_prefix(&token), error = %e, "Failed to open artifact");
            return error_response(&ZoteroMcpError::Io(e));
        }
    };

    if one_time {
        registry.schedule_cleanup(token.clone(), DELETE_GRACE);
    } else {
        registry.mark_downloaded(&token);
    }
    info!(
        token = token_prefix(&token),
        filename = %entry.filename,
        size = entry.size,
        "Serving artifact"
    );

    let mime = mime_guess::from_path(&entry.filename).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_LENGTH, entry.size)
        .header(header::CONTENT_DISPOSITION, content_disposition(&entry.filename))
        .header(header::CACHE_CONTROL, "no-store")
        .body(body)
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build download response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_escapes_quotes() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition("a\"b\n.docx"),
            "attachment; filename=\"a_b_.docx\""
        );
    }
}
