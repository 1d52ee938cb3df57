// src/zotero/client.rs
// Zotero Web API / local API client with response caching and rate limiting

use super::source::{
    ExportFormat, ExportScope, FetchOptions, LibrarySource, SearchQuery, UpstreamPayload,
};
use crate::cache::{RateLimiter, TtlCache};
use crate::config::{CacheConfig, ZoteroConfig};
use crate::error::{Result, ZoteroMcpError};
use crate::utils::truncate;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub const WEB_API_BASE: &str = "https://api.zotero.org";
pub const LOCAL_API_BASE: &str = "http://localhost:23119/api";
const API_VERSION: &str = "3";
/// Safety stop for fetch_all paging
const MAX_PAGES: usize = 500;

#[derive(Debug, Clone)]
struct Page {
    body: String,
    total: Option<u64>,
}

pub struct ZoteroClient {
    http: reqwest::Client,
    /// Library root, always ending in `/`
    base: Url,
    api_key: Option<String>,
    cache: TtlCache<Page>,
    limiter: RateLimiter,
    label: String,
}

impl ZoteroClient {
    pub fn from_config(zotero: &ZoteroConfig, cache: &CacheConfig, http: reqwest::Client) -> Result<Self> {
        if zotero.local {
            let id = zotero.library_id.as_deref().unwrap_or("0");
            let library = format!("{}/{}", zotero.library_type.path_segment(), id);
            return Self::with_base_url(
                http,
                &format!("{}/{}", LOCAL_API_BASE, library),
                None,
                cache,
                format!("Zotero local API ({})", library),
            );
        }

        let id = zotero.library_id.as_deref().ok_or_else(|| {
            ZoteroMcpError::Config(
                "ZOTERO_LIBRARY_ID is not set. Set it (and ZOTERO_API_KEY), or ZOTERO_LOCAL=true."
                    .to_string(),
            )
        })?;
        let library = format!("{}/{}", zotero.library_type.path_segment(), id);
        Self::with_base_url(
            http,
            &format!("{}/{}", WEB_API_BASE, library),
            zotero.api_key.clone(),
            cache,
            format!("Zotero Web API ({})", library),
        )
    }

    /// Client rooted at an explicit library URL such as `https://api.zotero.org/users/42`.
    pub fn with_base_url(
        http: reqwest::Client,
        library_url: &str,
        api_key: Option<String>,
        cache: &CacheConfig,
        label: String,
    ) -> Result<Self> {
        let mut root = library_url.trim_end_matches('/').to_string();
        root.push('/');
        let base = Url::parse(&root)
            .map_err(|e| ZoteroMcpError::Config(format!("Invalid Zotero API URL {}: {}", root, e)))?;
        Ok(Self {
            http,
            base,
            api_key,
            cache: TtlCache::new(cache.ttl, cache.max_entries),
            limiter: RateLimiter::new(cache.rate_min_interval),
            label,
        })
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ZoteroMcpError::Other(format!("bad API path {}: {}", path, e)))?;
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_page(&self, bucket: &str, url: Url) -> Result<Page> {
        if let Some(hit) = self.cache.get(url.as_str()) {
            debug!(bucket, "Zotero cache hit");
            return Ok(hit);
        }

        self.limiter.acquire(bucket).await;
        let mut request = self
            .http
            .get(url.clone())
            .header("Zotero-API-Version", API_VERSION);
        if let Some(key) = &self.api_key {
            request = request.header("Zotero-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total = response
            .headers()
            .get("Total-Results")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await?;

        if !status.is_success() {
            warn!(bucket, status = status.as_u16(), "Zotero request failed");
            return Err(upstream_error(status.as_u16(), retry_after.as_deref(), &body));
        }

        let page = Page { body, total };
        self.cache.insert(url.to_string(), page.clone());
        Ok(page)
    }

    async fn get_pages(
        &self,
        bucket: &str,
        path: &str,
        params: &[(&str, String)],
        options: FetchOptions,
    ) -> Result<Vec<Page>> {
        let size = options.page_size();
        let mut start: u64 = 0;
        let mut pages = Vec::new();
        loop {
            let mut query = params.to_vec();
            query.push(("limit", size.to_string()));
            query.push(("start", start.to_string()));
            let page = self.get_page(bucket, self.url(path, &query)?).await?;
            let total = page.total;
            pages.push(page);
            start += u64::from(size);

            let more = options.fetch_all && total.is_some_and(|t| start < t);
            if !more {
                break;
            }
            if pages.len() >= MAX_PAGES {
                warn!(bucket, pages = pages.len(), "Stopped paging at the page limit");
                break;
            }
        }
        debug!(bucket, pages = pages.len(), "Fetched Zotero pages");
        Ok(pages)
    }

    async fn records(&self, bucket: &str, path: &str, params: &[(&str, String)], options: FetchOptions) -> Result<Vec<Value>> {
        let pages = self.get_pages(bucket, path, params, options).await?;
        let mut out = Vec::new();
        for page in pages {
            match serde_json::from_str::<Value>(&page.body) {
                Ok(Value::Array(items)) => out.extend(items),
                _ => {
                    return Err(ZoteroMcpError::Upstream {
                        status: None,
                        message: format!(
                            "expected a JSON array of records, got: {}",
                            truncate(page.body.trim(), 120)
                        ),
                        hint: None,
                    });
                }
            }
        }
        Ok(out)
    }
}

fn scope_path(scope: &ExportScope) -> Result<String> {
    match scope {
        ExportScope::Library => Ok("items".to_string()),
        ExportScope::Collection(key) => Ok(format!("collections/{}/items", check_key(key)?)),
    }
}

/// Zotero object keys are short alphanumeric strings.
fn check_key(key: &str) -> Result<&str> {
    check_object_key("collection", key)
}

fn check_object_key<'a>(kind: &str, key: &'a str) -> Result<&'a str> {
    let key = key.trim();
    if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(key)
    } else {
        Err(ZoteroMcpError::InputShape(format!(
            "Invalid {} key '{}'.",
            kind, key
        )))
    }
}

/// Merge paged JSON exports: arrays concatenate, `{items: [...]}` objects merge their items.
fn merge_json_pages(values: Vec<Value>) -> Value {
    let mut single: Option<Value> = None;
    let mut items = Vec::new();
    let mut wrapped = false;
    let count = values.len();
    for value in values {
        match value {
            Value::Array(list) => items.extend(list),
            Value::Object(mut obj) if obj.get("items").is_some_and(Value::is_array) => {
                wrapped = true;
                if let Some(Value::Array(list)) = obj.remove("items") {
                    items.extend(list);
                }
            }
            other if count == 1 => single = Some(other),
            other => items.push(other),
        }
    }
    if let Some(value) = single {
        return value;
    }
    if wrapped {
        serde_json::json!({ "items": items })
    } else {
        Value::Array(items)
    }
}

/// One-line guidance for common Zotero API failures.
pub fn status_hint(status: u16, retry_after: Option<&str>) -> Option<String> {
    let hint = match status {
        400 => "Bad request: check collection keys and query parameters.".to_string(),
        403 => "Forbidden: the API key lacks access to this library, or the library id/type is wrong."
            .to_string(),
        404 => "Not found: check the library id and collection key.".to_string(),
        409 => "Conflict: the library is locked; retry shortly.".to_string(),
        412 => "Precondition failed: the library changed since it was read; refetch and retry."
            .to_string(),
        413 => "Request too large: lower the limit or export a smaller collection.".to_string(),
        429 => match retry_after {
            Some(secs) => format!("Rate limited by Zotero; retry after {} seconds.", secs.trim()),
            None => "Rate limited by Zotero; wait before retrying.".to_string(),
        },
        _ => return None,
    };
    Some(hint)
}

fn upstream_error(status: u16, retry_after: Option<&str>, body: &str) -> ZoteroMcpError {
    let detail = truncate(body.trim(), 200);
    ZoteroMcpError::Upstream {
        status: Some(status),
        message: if detail.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, detail)
        },
        hint: status_hint(status, retry_after),
    }
}

#[async_trait]
impl LibrarySource for ZoteroClient {
    async fn export(
        &self,
        scope: &ExportScope,
        format: ExportFormat,
        options: FetchOptions,
    ) -> Result<UpstreamPayload> {
        let path = scope_path(scope)?;
        let params = [("format", format.as_str().to_string())];
        let pages = self.get_pages("zot.export", &path, &params, options).await?;

        if format == ExportFormat::Csljson {
            let parsed: std::result::Result<Vec<Value>, _> = pages
                .iter()
                .map(|p| serde_json::from_str::<Value>(&p.body))
                .collect();
            if let Ok(values) = parsed {
                return Ok(UpstreamPayload::Json(merge_json_pages(values)));
            }
        }
        let text = pages
            .into_iter()
            .map(|p| p.body)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(UpstreamPayload::Text(text))
    }

    async fn items(&self, scope: &ExportScope, options: FetchOptions) -> Result<Vec<Value>> {
        let path = scope_path(scope)?;
        self.records("zot.items", &path, &[], options).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let mut params = vec![
            ("q", query.q.trim().to_string()),
            ("qmode", query.mode.as_str().to_string()),
        ];
        if let Some(tag) = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            params.push(("tag", tag.to_string()));
        }
        let options = FetchOptions {
            limit: query.limit,
            fetch_all: false,
        };
        self.records("zot.search", "items", &params, options).await
    }

    async fn collections(&self, parent: Option<&str>) -> Result<Vec<Value>> {
        let path = match parent {
            Some(key) => format!("collections/{}/collections", check_key(key)?),
            None => "collections".to_string(),
        };
        self.records("zot.collections", &path, &[], FetchOptions::default())
            .await
    }

    async fn collection(&self, key: &str) -> Result<Value> {
        let url = self.url(&format!("collections/{}", check_key(key)?), &[])?;
        let page = self.get_page("zot.collections", url).await?;
        Ok(serde_json::from_str(&page.body)?)
    }

    async fn item(&self, key: &str) -> Result<Value> {
        let url = self.url(&format!("items/{}", check_object_key("item", key)?), &[])?;
        let page = self.get_page("zot.item", url).await?;
        Ok(serde_json::from_str(&page.body)?)
    }

    async fn children(&self, key: &str) -> Result<Vec<Value>> {
        let path = format!("items/{}/children", check_object_key("item", key)?);
        self.records("zot.item", &path, &[], FetchOptions::default())
            .await
    }

    async fn fulltext(&self, key: &str) -> Result<Option<Value>> {
        let url = self.url(&format!("items/{}/fulltext", check_object_key("item", key)?), &[])?;
        match self.get_page("zot.fulltext", url).await {
            Ok(page) => Ok(Some(serde_json::from_str(&page.body)?)),
            // not indexed
            Err(ZoteroMcpError::Upstream { status: Some(404), .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn no_wait_cache() -> CacheConfig {
        CacheConfig {
            rate_min_interval: Duration::ZERO,
            ..CacheConfig::default()
        }
    }

    async fn client(base: &str, key: Option<&str>) -> ZoteroClient {
        ZoteroClient::with_base_url(
            reqwest::Client::new(),
            &format!("{}/users/1", base),
            key.map(str::to_string),
            &no_wait_cache(),
            "test".to_string(),
        )
        .unwrap()
    }

    /// Five records served two per page.
    async fn paged_items(
        State(hits): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        hits.fetch_add(1, Ordering::SeqCst);
        assert_eq!(headers.get("Zotero-API-Version").unwrap(), "3");
        let start: usize = params.get("start").and_then(|s| s.parse().ok()).unwrap_or(0);
        let limit: usize = params.get("limit").and_then(|s| s.parse().ok()).unwrap_or(100);
        let all: Vec<Value> = (0..5).map(|i| json!({"key": format!("K{i}"), "data": {}})).collect();
        let page: Vec<Value> = all.into_iter().skip(start).take(limit).collect();
        let body = if params.get("format").map(String::as_str) == Some("csljson") {
            json!({ "items": page })
        } else {
            Value::Array(page)
        };
        ([("Total-Results", "5")], axum::Json(body))
    }

    // ============================================================================
    // Paging and caching
    // ============================================================================

    #[tokio::test]
    async fn test_fetch_all_follows_total_results() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/users/1/items", get(paged_items))
            .with_state(Arc::clone(&hits));
        let base = serve(router).await;
        let zot = client(&base, Some("secret")).await;

        let opts = FetchOptions { limit: 2, fetch_all: true };
        let items = zot.items(&ExportScope::Library, opts).await.unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // identical URLs come from the cache
        zot.items(&ExportScope::Library, opts).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_page_when_not_fetch_all() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/users/1/items", get(paged_items))
            .with_state(Arc::clone(&hits));
        let base = serve(router).await;
        let zot = client(&base, None).await;

        let opts = FetchOptions { limit: 2, fetch_all: false };
        let items = zot.items(&ExportScope::Library, opts).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_csljson_pages_merge_items() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/users/1/items", get(paged_items))
            .with_state(hits);
        let base = serve(router).await;
        let zot = client(&base, None).await;

        let payload = zot
            .export(
                &ExportScope::Library,
                ExportFormat::Csljson,
                FetchOptions { limit: 2, fetch_all: true },
            )
            .await
            .unwrap();
        let UpstreamPayload::Json(value) = payload else {
            panic!("expected json");
        };
        assert_eq!(value["items"].as_array().unwrap().len(), 5);
    }

    // ============================================================================
    // Errors
    // ============================================================================

    #[tokio::test]
    async fn test_rate_limit_status_hint() {
        let router = Router::new().route(
            "/users/1/items",
            get(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("Retry-After", "7")],
                    "Too many requests",
                )
            }),
        );
        let base = serve(router).await;
        let zot = client(&base, None).await;

        let err = zot
            .items(&ExportScope::Library, FetchOptions::default())
            .await
            .unwrap_err();
        match err {
            ZoteroMcpError::Upstream { status, hint, .. } => {
                assert_eq!(status, Some(429));
                assert!(hint.unwrap().contains("7 seconds"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_collection_key_rejected() {
        let zot = client("http://127.0.0.1:9", None).await;
        let err = zot
            .items(&ExportScope::Collection("../x".into()), FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ZoteroMcpError::InputShape(_)));
    }

    #[tokio::test]
    async fn test_item_children_and_fulltext() {
        let router = Router::new()
            .route(
                "/users/1/items/ITEM1",
                get(|| async { axum::Json(json!({"key": "ITEM1", "data": {"title": "T"}})) }),
            )
            .route(
                "/users/1/items/ITEM1/children",
                get(|| async {
                    (
                        [("Total-Results", "1")],
                        axum::Json(json!([{"key": "ATT1", "data": {"itemType": "attachment"}}])),
                    )
                }),
            )
            .route(
                "/users/1/items/ATT1/fulltext",
                get(|| async { axum::Json(json!({"content": "full text", "indexedPages": 1})) }),
            )
            .route(
                "/users/1/items/ATT2/fulltext",
                get(|| async { (StatusCode::NOT_FOUND, "Not found") }),
            );
        let base = serve(router).await;
        let zot = client(&base, None).await;

        assert_eq!(zot.item("ITEM1").await.unwrap()["data"]["title"], "T");
        assert_eq!(zot.children("ITEM1").await.unwrap()[0]["key"], "ATT1");
        assert_eq!(
            zot.fulltext("ATT1").await.unwrap().unwrap()["content"],
            "full text"
        );
        assert!(zot.fulltext("ATT2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_item_key_rejected() {
        let zot = client("http://127.0.0.1:9", None).await;
        match zot.item("a/b").await {
            Err(ZoteroMcpError::InputShape(msg)) => assert!(msg.contains("item key")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_hints() {
        for status in [400, 403, 409, 412, 413] {
            assert!(status_hint(status, None).is_some(), "{status}");
        }
        assert!(status_hint(500, None).is_none());
    }

    #[test]
    fn test_from_config_requires_library_id() {
        let err = ZoteroClient::from_config(
            &ZoteroConfig::default(),
            &CacheConfig::default(),
            reqwest::Client::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ZoteroMcpError::Config(_)));

        let local = ZoteroConfig {
            local: true,
            ..ZoteroConfig::default()
        };
        let zot = ZoteroClient::from_config(&local, &CacheConfig::default(), reqwest::Client::new()).unwrap();
        assert_eq!(zot.base.as_str(), "http://localhost:23119/api/users/0/");
    }

    #[test]
    fn test_merge_json_pages() {
        assert_eq!(
            merge_json_pages(vec![json!([1]), json!([2, 3])]),
            json!([1, 2, 3])
        );
        assert_eq!(
            merge_json_pages(vec![json!({"items": [1]}), json!({"items": [2]})]),
            json!({"items": [1, 2]})
        );
        assert_eq!(merge_json_pages(vec![json!("x")]), json!("x"));
    }
}
