//! Core tool implementations for MCP.
//!
//! All tools are implemented as async functions that accept `&impl ToolContext`
//! and return `Result<Json<...>, ZoteroMcpError>`; the MCP router turns errors
//! into the structured error payload.

use crate::bibliography::{BibliographyPayload, RawText, normalize_path, normalize_text, text_from_value};
use crate::config::EnvConfig;
use crate::error::{Result, ZoteroMcpError};
use crate::export::{BuildEnvironment, current_search_path};
use crate::registry::FileRegistry;
use crate::zotero::{LibrarySource, StyleFetcher, SuggestionCache};
use serde_json::Value;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Standard error message when no library credentials are configured.
pub const NO_LIBRARY_ERROR: &str = "Zotero is not configured: set ZOTERO_LIBRARY_ID and ZOTERO_API_KEY, or ZOTERO_LOCAL=true.";

/// Common context required by all tools.
/// Implemented by ZoteroServer (MCP) and the test context.
pub trait ToolContext: Send + Sync {
    // === Core Resources (always available) ===

    fn config(&self) -> &EnvConfig;

    /// Token registry for built artifacts
    fn registry(&self) -> &Arc<FileRegistry>;

    fn styles(&self) -> &StyleFetcher;

    // === Optional Services ===

    /// Reference manager access; `None` when no credentials are configured
    fn library(&self) -> Option<&Arc<dyn LibrarySource>>;

    /// Recent search results ranked by zotero_suggest_citations
    fn suggestions(&self) -> &SuggestionCache;

    // === Environment ===

    /// Directories searched for pandoc and PDF engines
    fn search_path(&self) -> Option<OsString> {
        current_search_path()
    }

    /// Base URL download links are built on
    fn public_base_url(&self) -> String {
        self.config().server.public_base_url()
    }

    /// Parent for per-build temp dirs; the system temp dir when `None`
    fn temp_root(&self) -> Option<PathBuf> {
        None
    }
}

pub fn require_library<C: ToolContext + ?Sized>(ctx: &C) -> Result<&Arc<dyn LibrarySource>> {
    ctx.library()
        .ok_or_else(|| ZoteroMcpError::Config(NO_LIBRARY_ERROR.to_string()))
}

pub fn build_environment<C: ToolContext + ?Sized>(ctx: &C) -> BuildEnvironment<'_> {
    BuildEnvironment {
        config: &ctx.config().export,
        registry: ctx.registry().as_ref(),
        public_base_url: ctx.public_base_url(),
        search_path: ctx.search_path(),
        temp_root: ctx.temp_root(),
    }
}

/// Document text from inline content, or read from `path` on this host.
pub async fn document_text<C: ToolContext + ?Sized>(
    ctx: &C,
    content: Option<&Value>,
    path: Option<&str>,
) -> Result<String> {
    if let Some(content) = content.filter(|v| !v.is_null()) {
        return text_from_value(content);
    }
    let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
        return Err(ZoteroMcpError::InputShape(
            "documentContent or documentPath is required.".to_string(),
        ));
    };
    let resolved = normalize_path(path, &ctx.config().paths);
    debug!(input = path, resolved = %resolved.display(), "Reading document from path");
    match tokio::fs::read(&resolved).await {
        Ok(bytes) => Ok(normalize_text(RawText::Bytes(bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ZoteroMcpError::InputShape(
            format!("Document not found: {}", resolved.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Bibliography tool argument; `null` and absent both mean none.
pub fn bibliography_payload(value: Option<Value>) -> Result<Option<BibliographyPayload>> {
    Ok(value
        .map(BibliographyPayload::from_value)
        .transpose()?
        .flatten())
}

// Sub-modules with tool implementations
pub mod bibliography;
pub mod build;
pub mod citations;
pub mod health;
pub mod library;

// Re-export handler functions used by MCP router, CLI, and tests
pub use bibliography::{
    export_bibliography_content, normalize_bibliography, resolve_citekeys,
    validate_references_content,
};
pub use build::build_exports_content;
pub use citations::{ensure_style_content, ensure_yaml_citations_content, insert_citation_content};
pub use health::health;
pub use library::{get_collections, item_fulltext, item_metadata, search_items, suggest_citations};
