// src/zotero/styles.rs
// CSL style retrieval by repository id or URL

use crate::cache::TtlCache;
use crate::error::{Result, ZoteroMcpError};
use crate::utils::sha256_hex;
use reqwest::header::ETAG;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const STYLES_REPOSITORY: &str =
    "https://raw.githubusercontent.com/citation-style-language/styles/master";

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchedStyle {
    pub content: String,
    pub sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub source_url: String,
    pub bytes: usize,
}

pub struct StyleFetcher {
    http: reqwest::Client,
    repository: String,
    cache: TtlCache<FetchedStyle>,
}

impl StyleFetcher {
    pub fn new(http: reqwest::Client, ttl: Duration, max_entries: usize) -> Self {
        Self::with_repository(http, STYLES_REPOSITORY, ttl, max_entries)
    }

    pub fn with_repository(http: reqwest::Client, repository: &str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            http,
            repository: repository.trim_end_matches('/').to_string(),
            cache: TtlCache::new(ttl, max_entries),
        }
    }

    /// Where `style` (a style id like `apa` or an http(s) URL) is fetched from.
    pub fn resolve_url(&self, style: &str) -> Result<Url> {
        let style = style.trim();
        if style.is_empty() {
            return Err(ZoteroMcpError::InputShape("style is required.".to_string()));
        }
        if let Ok(url) = Url::parse(style)
            && matches!(url.scheme(), "http" | "https")
        {
            return Ok(url);
        }
        let valid_id = style
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_');
        if !valid_id || style.contains("..") {
            return Err(ZoteroMcpError::InputShape(format!(
                "'{}' is neither a CSL style id nor an http(s) URL.",
                style
            )));
        }
        let file = if style.ends_with(".csl") {
            style.to_string()
        } else {
            format!("{}.csl", style)
        };
        Url::parse(&format!("{}/{}", self.repository, file))
            .map_err(|e| ZoteroMcpError::Config(format!("Invalid styles repository URL: {}", e)))
    }

    pub async fn fetch(&self, style: &str) -> Result<FetchedStyle> {
        let url = self.resolve_url(style)?;
        if let Some(hit) = self.cache.get(url.as_str()) {
            debug!(url = %url, "Style cache hit");
            return Ok(hit);
        }

        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ZoteroMcpError::Upstream {
                status: Some(status.as_u16()),
                message: format!("fetching {} returned HTTP {}", url, status.as_u16()),
                hint: (status.as_u16() == 404).then(|| {
                    "Check the style id against https://www.zotero.org/styles.".to_string()
                }),
            });
        }
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if !content.contains("<style") {
            return Err(ZoteroMcpError::InputShape(format!(
                "{} did not return a CSL style document.",
                url
            )));
        }

        let style = FetchedStyle {
            sha256: sha256_hex(&bytes),
            bytes: bytes.len(),
            content,
            etag,
            source_url: url.to_string(),
        };
        info!(url = %url, bytes = style.bytes, "Fetched CSL style");
        self.cache.insert(url.to_string(), style.clone());
        Ok(style)
    }
}
