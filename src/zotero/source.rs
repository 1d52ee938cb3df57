// src/zotero/source.rs
// Library access seam: the Web/local API client and test doubles implement this

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Items per page the Zotero API accepts at most
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    Library,
    Collection(String),
}

impl ExportScope {
    pub fn describe(&self) -> String {
        match self {
            ExportScope::Library => "library".to_string(),
            ExportScope::Collection(key) => format!("collection {}", key),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csljson,
    Bibtex,
    Biblatex,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csljson => "csljson",
            ExportFormat::Bibtex => "bibtex",
            ExportFormat::Biblatex => "biblatex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Page size, clamped to 1..=100
    pub limit: u32,
    /// Follow pages until Total-Results is reached
    pub fetch_all: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_SIZE,
            fetch_all: true,
        }
    }
}

impl FetchOptions {
    pub fn page_size(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
pub enum QueryMode {
    #[default]
    #[serde(rename = "titleCreatorYear")]
    TitleCreatorYear,
    #[serde(rename = "everything")]
    Everything,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::TitleCreatorYear => "titleCreatorYear",
            QueryMode::Everything => "everything",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub q: String,
    pub mode: QueryMode,
    pub tag: Option<String>,
    pub limit: u32,
}

/// Export body as the API returned it.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamPayload {
    Json(Value),
    Text(String),
}

impl UpstreamPayload {
    /// Parse text bodies that happen to be JSON.
    pub fn parse(body: String) -> Self {
        let trimmed = body.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(value) = serde_json::from_str(trimmed)
        {
            return UpstreamPayload::Json(value);
        }
        UpstreamPayload::Text(body)
    }
}

#[async_trait]
pub trait LibrarySource: Send + Sync {
    /// Export items in a citation format.
    async fn export(
        &self,
        scope: &ExportScope,
        format: ExportFormat,
        options: FetchOptions,
    ) -> Result<UpstreamPayload>;

    /// Native item records (`{key, data: {...}, meta}`).
    async fn items(&self, scope: &ExportScope, options: FetchOptions) -> Result<Vec<Value>>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>>;

    /// All collections, or the direct children of `parent`.
    async fn collections(&self, parent: Option<&str>) -> Result<Vec<Value>>;

    async fn collection(&self, key: &str) -> Result<Value>;

    /// One native record by item key.
    async fn item(&self, key: &str) -> Result<Value>;

    /// Child items (attachments, notes) of an item.
    async fn children(&self, key: &str) -> Result<Vec<Value>>;

    /// Indexed full text of an attachment; `None` when Zotero has not indexed it.
    async fn fulltext(&self, key: &str) -> Result<Option<Value>>;

    /// One-line description for health output (never includes the API key).
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_parse() {
        assert_eq!(
            UpstreamPayload::parse(r#"{"items":[]}"#.to_string()),
            UpstreamPayload::Json(json!({"items": []}))
        );
        assert!(matches!(
            UpstreamPayload::parse("@article{a,\n}".to_string()),
            UpstreamPayload::Text(_)
        ));
        assert!(matches!(
            UpstreamPayload::parse("[not json".to_string()),
            UpstreamPayload::Text(_)
        ));
    }

    #[test]
    fn test_page_size_clamped() {
        let opts = FetchOptions {
            limit: 500,
            fetch_all: false,
        };
        assert_eq!(opts.page_size(), 100);
        assert_eq!(FetchOptions { limit: 0, ..opts }.page_size(), 1);
    }
}
