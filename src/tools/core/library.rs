// src/tools/core/library.rs
// Read-only library tools: search, items, suggestions and collections

use super::{ToolContext, require_library};
use crate::error::{ErrorCode, Result, ZoteroMcpError};
use crate::mcp::requests::{
    GetCollectionsRequest, ItemKeyRequest, SearchItemsRequest, SuggestCitationsRequest,
};
use crate::mcp::responses::{
    CollectionsData, CollectionsOutput, FulltextData, ItemFulltextOutput, ItemMetadataOutput,
    Json, SearchData, SearchOutput, SuggestionsData, SuggestionsOutput, ToolOutput,
};
use crate::zotero::source::MAX_PAGE_SIZE;
use crate::zotero::suggest::rank;
use crate::zotero::{
    LibrarySource, QueryMode, SearchQuery, SuggestionCache, collection_tree, item_details,
    pick_attachment, summarize_item,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const DEFAULT_SUGGEST_LIMIT: u32 = 5;
const MIN_SUGGEST_TEXT_CHARS: usize = 3;
/// Extra attempts after the first failed suggestion search
const SUGGEST_RETRIES: u32 = 2;
const SUGGEST_BACKOFF: Duration = Duration::from_millis(150);

pub async fn search_items<C: ToolContext + ?Sized>(
    ctx: &C,
    req: SearchItemsRequest,
) -> Result<Json<SearchOutput>> {
    let q = req.query.trim().to_string();
    if q.is_empty() {
        return Err(ZoteroMcpError::InputShape("query must not be empty.".to_string()));
    }
    let query = SearchQuery {
        q,
        mode: req.qmode.unwrap_or_default(),
        tag: req.tag.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        limit: req.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).clamp(1, MAX_PAGE_SIZE),
    };
    let records = require_library(ctx)?.search(&query).await?;
    ctx.suggestions().remember_search(&query, &records);
    let items: Vec<_> = records.iter().map(summarize_item).collect();
    let count = items.len();

    let message = if count == 0 {
        format!("No items found for '{}'.", query.q)
    } else {
        format!("{} item(s) found for '{}'.", count, query.q)
    };
    Ok(Json(ToolOutput::new(
        "search",
        message,
        SearchData {
            query: query.q,
            qmode: query.mode.as_str().to_string(),
            items,
            count,
        },
    )))
}

fn item_key(raw: &str) -> Result<&str> {
    let key = raw.trim();
    if key.is_empty() {
        return Err(ZoteroMcpError::InputShape("itemKey must not be empty.".to_string()));
    }
    Ok(key)
}

pub async fn item_metadata<C: ToolContext + ?Sized>(
    ctx: &C,
    req: ItemKeyRequest,
) -> Result<Json<ItemMetadataOutput>> {
    let key = item_key(&req.item_key)?;
    let record = require_library(ctx)?.item(key).await?;
    let details = item_details(&record);
    Ok(Json(ToolOutput::new(
        "metadata",
        format!("{} ({})", details.summary.title, details.summary.item_type),
        details,
    )))
}

pub async fn item_fulltext<C: ToolContext + ?Sized>(
    ctx: &C,
    req: ItemKeyRequest,
) -> Result<Json<ItemFulltextOutput>> {
    let key = item_key(&req.item_key)?;
    let library = require_library(ctx)?;
    let record = library.item(key).await?;
    let item = summarize_item(&record);

    let children = if item.item_type == "attachment" {
        Vec::new()
    } else {
        library.children(key).await?
    };
    let Some(attachment) = pick_attachment(&record, &children) else {
        return Ok(Json(ToolOutput::new(
            "fulltext",
            format!("{} has no attachment with extractable text.", item.title),
            FulltextData {
                item,
                attachment: None,
                content: None,
                word_count: 0,
            },
        )));
    };

    let content = library
        .fulltext(&attachment.key)
        .await?
        .and_then(|text| text.get("content").and_then(Value::as_str).map(str::to_string))
        .filter(|text| !text.trim().is_empty());
    let word_count = content.as_deref().map_or(0, |c| c.split_whitespace().count());
    debug!(item = key, attachment = %attachment.key, word_count, "Fetched full text");

    let message = match &content {
        Some(_) => format!(
            "Full text of {} from attachment {} ({}, ~{} words).",
            item.title, attachment.key, attachment.content_type, word_count
        ),
        None => format!(
            "Attachment {} of {} has no indexed full text.",
            attachment.key, item.title
        ),
    };
    Ok(Json(ToolOutput::new(
        "fulltext",
        message,
        FulltextData {
            item,
            attachment: Some(attachment),
            content,
            word_count,
        },
    )))
}

/// Search Zotero for suggestion candidates. A failed broad search is retried once
/// as titleCreatorYear; further failures back off linearly.
async fn fetch_candidates(
    library: &dyn LibrarySource,
    cache: &SuggestionCache,
    text: &str,
    mut mode: QueryMode,
    limit: u32,
) -> Result<(Vec<Value>, QueryMode)> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        cache.throttle().await;
        let query = SearchQuery {
            q: text.to_string(),
            mode,
            tag: None,
            limit,
        };
        match library.search(&query).await {
            Ok(records) => return Ok((records, mode)),
            Err(e) if e.code() != ErrorCode::UpstreamError || attempt > SUGGEST_RETRIES => {
                return Err(e);
            }
            Err(e) if attempt == 1 && mode != QueryMode::TitleCreatorYear => {
                warn!(error = %e, "Suggestion search failed, retrying with titleCreatorYear");
                mode = QueryMode::TitleCreatorYear;
            }
            Err(e) => {
                let delay = SUGGEST_BACKOFF * attempt;
                warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Suggestion search failed, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

pub async fn suggest_citations<C: ToolContext + ?Sized>(
    ctx: &C,
    req: SuggestCitationsRequest,
) -> Result<Json<SuggestionsOutput>> {
    let text = req.text.trim();
    if text.chars().count() < MIN_SUGGEST_TEXT_CHARS {
        return Err(ZoteroMcpError::InputShape(format!(
            "text is too short to suggest citations (at least {} characters).",
            MIN_SUGGEST_TEXT_CHARS
        )));
    }
    let library = require_library(ctx)?;
    let limit = req.limit.unwrap_or(DEFAULT_SUGGEST_LIMIT).clamp(1, MAX_PAGE_SIZE);
    let requested_mode = req.qmode.unwrap_or_default();
    let settings = &ctx.config().suggest;
    let cache = ctx.suggestions();

    let pool = if settings.local_first {
        cache.local_pool()
    } else {
        Vec::new()
    };

    let mut mode = requested_mode;
    let (mut suggestions, mut source) = if pool.is_empty() {
        let key = SuggestionCache::key(text, requested_mode, limit);
        let (records, source) = match cache.candidates(&key) {
            Some(records) => (records, "cache"),
            None => {
                let (records, used) =
                    fetch_candidates(&**library, cache, text, requested_mode, limit).await?;
                mode = used;
                cache.store_candidates(key, records.clone());
                (records, "server")
            }
        };
        (rank(text, &records, limit as usize), source)
    } else {
        let mut local = rank(text, &pool, limit as usize);
        local.retain(|s| s.score > 0);
        (local, "local")
    };

    let best = suggestions.first().map_or(0, |s| s.score);
    if source == "local" && best < settings.local_threshold {
        debug!(best, threshold = settings.local_threshold, "Local suggestions below threshold");
        match fetch_candidates(&**library, cache, text, requested_mode, limit).await {
            Ok((records, used)) if !records.is_empty() => {
                mode = used;
                suggestions = rank(text, &records, limit as usize);
                source = "server";
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Server suggestions unavailable, keeping local results"),
        }
    }

    let count = suggestions.len();
    info!(count, source, "Suggested citations");
    let message = if count == 0 {
        "No suggestions found.".to_string()
    } else {
        format!("Top {} suggestion(s).", count)
    };
    Ok(Json(ToolOutput::new(
        "suggest",
        message,
        SuggestionsData {
            qmode: mode.as_str().to_string(),
            source: source.to_string(),
            suggestions,
            count,
        },
    )))
}

pub async fn get_collections<C: ToolContext + ?Sized>(
    ctx: &C,
    req: GetCollectionsRequest,
) -> Result<Json<CollectionsOutput>> {
    let library = require_library(ctx)?;
    let parent_key = req
        .parent_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let (records, prefix) = match parent_key.as_deref() {
        Some(parent) => {
            let record = library.collection(parent).await?;
            let name = record
                .get("data")
                .and_then(|d| d.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            (library.collections(Some(parent)).await?, name)
        }
        None => (library.collections(None).await?, None),
    };
    let collections = collection_tree(&records, prefix.as_deref());
    let count = collections.len();

    Ok(Json(ToolOutput::new(
        "collections",
        match &parent_key {
            Some(parent) => format!("{} collection(s) under {}.", count, parent),
            None => format!("{} collection(s).", count),
        },
        CollectionsData {
            parent_key,
            collections,
            count,
        },
    )))
}
