// src/error.rs
// Error taxonomy for tool calls and the export pipeline

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Main error type for the zotero-mcp library
#[derive(Error, Debug)]
pub enum ZoteroMcpError {
    /// Caller supplied a value the pipeline cannot accept.
    #[error("invalid input: {0}")]
    InputShape(String),

    #[error("unsupported formats: {}", .requested.join(", "))]
    UnsupportedFormat {
        requested: Vec<String>,
        supported: Vec<&'static str>,
    },

    /// Conversion binary or rendering engine not found.
    #[error("{message}")]
    DependencyMissing {
        message: String,
        remediation: Option<String>,
        details: Option<Value>,
    },

    #[error("{format} build failed: {message}")]
    FormatExecution { format: String, message: String },

    #[error("file token not found or expired")]
    TokenNotFound,

    #[error("file for this token is no longer available")]
    TokenGone,

    #[error("Zotero request failed: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        hint: Option<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unknown error: {0}")]
    Other(String),
}

/// Convenience type alias for Result using ZoteroMcpError
pub type Result<T> = std::result::Result<T, ZoteroMcpError>;

/// Stable machine-readable error codes returned to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InputShape,
    UnsupportedFormat,
    DependencyMissing,
    FormatExecution,
    TokenNotFound,
    TokenGone,
    UpstreamError,
    ConfigError,
    Internal,
}

/// Structured error returned at tool boundaries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ZoteroMcpError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InputShape(_) | Self::Yaml(_) => ErrorCode::InputShape,
            Self::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            Self::DependencyMissing { .. } => ErrorCode::DependencyMissing,
            Self::FormatExecution { .. } => ErrorCode::FormatExecution,
            Self::TokenNotFound => ErrorCode::TokenNotFound,
            Self::TokenGone => ErrorCode::TokenGone,
            Self::Upstream { .. } | Self::Http(_) => ErrorCode::UpstreamError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCode::Internal,
        }
    }

    /// Build the caller-facing payload. Lower-level causes only appear in `details`.
    pub fn payload(&self) -> ErrorPayload {
        let (message, remediation, details) = match self {
            Self::InputShape(msg) => (msg.clone(), None, None),
            Self::Yaml(e) => (
                "Front matter is not valid YAML.".to_string(),
                Some("Fix the YAML between the leading --- markers and retry.".to_string()),
                Some(json!({ "cause": e.to_string() })),
            ),
            Self::UnsupportedFormat {
                requested,
                supported,
            } => (
                format!(
                    "Unsupported formats: {}. Supported: {}.",
                    requested.join(", "),
                    supported.join(", ")
                ),
                None,
                Some(json!({ "unsupported": requested, "supported": supported })),
            ),
            Self::DependencyMissing {
                message,
                remediation,
                details,
            } => (message.clone(), remediation.clone(), details.clone()),
            Self::FormatExecution { format, message } => (
                format!("Building {} failed.", format),
                None,
                Some(json!({ "format": format, "cause": message })),
            ),
            Self::TokenNotFound => (
                "File not found or expired.".to_string(),
                Some("Rebuild the document to get a fresh download token.".to_string()),
                None,
            ),
            Self::TokenGone => (
                "The file for this token was removed from the server.".to_string(),
                Some("Rebuild the document to get a fresh download token.".to_string()),
                None,
            ),
            Self::Upstream {
                status,
                message,
                hint,
            } => (
                format!("Zotero request failed: {}", message),
                hint.clone(),
                status.map(|s| json!({ "status": s })),
            ),
            Self::Http(e) => (
                "Could not reach the remote service.".to_string(),
                Some("Check network access and retry.".to_string()),
                Some(json!({ "cause": e.to_string() })),
            ),
            Self::Config(msg) => (
                msg.clone(),
                Some("Check the server environment configuration.".to_string()),
                None,
            ),
            Self::Io(e) => (
                "A file operation failed on the server.".to_string(),
                None,
                Some(json!({ "cause": e.to_string() })),
            ),
            Self::Json(e) => (
                "Could not serialize the result.".to_string(),
                None,
                Some(json!({ "cause": e.to_string() })),
            ),
            Self::Other(msg) => (msg.clone(), None, None),
        };

        ErrorPayload {
            error_code: self.code(),
            message,
            remediation,
            details,
        }
    }

    /// Convert to user-facing string for MCP tool boundaries
    pub fn to_user_string(&self) -> String {
        serde_json::to_string(&self.payload()).unwrap_or_else(|_| self.to_string())
    }
}

impl From<String> for ZoteroMcpError {
    fn from(s: String) -> Self {
        ZoteroMcpError::Other(s)
    }
}

impl From<tokio::task::JoinError> for ZoteroMcpError {
    fn from(err: tokio::task::JoinError) -> Self {
        ZoteroMcpError::Other(format!("background task failed: {}", err))
    }
}

impl From<ZoteroMcpError> for String {
    fn from(err: ZoteroMcpError) -> Self {
        err.to_user_string()
    }
}
