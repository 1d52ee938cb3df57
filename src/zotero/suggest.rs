// src/zotero/suggest.rs
// Token-overlap ranking of library items against free text

use super::records::{str_field, summarize_item};
use super::source::{QueryMode, SearchQuery};
use crate::cache::{RateLimiter, TtlCache};
use crate::config::CacheConfig;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w-]+").expect("valid regex"));

/// Query tokens shorter than this carry no signal
const MIN_TOKEN_CHARS: usize = 3;
/// Matched tokens reported per field
const MAX_MATCHES_SHOWN: usize = 3;
/// Suggestion cache keys use at most this much of the text
const KEY_TEXT_CHARS: usize = 200;
const RATE_BUCKET: &str = "zot.suggest";

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub key: String,
    pub title: String,
    pub creators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citekey: Option<String>,
    /// Two points per title token, one per creator token, one for a DOI hit
    pub score: u32,
    pub matched_title: Vec<String>,
    pub matched_creators: Vec<String>,
    pub has_doi: bool,
    /// e.g. `title:carbon/soil; creator:smith; doi`
    pub rationale: String,
}

fn tokens(text: &str) -> BTreeSet<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

pub fn query_tokens(text: &str) -> BTreeSet<String> {
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// Score one native record against the query tokens.
pub fn score_item(query: &BTreeSet<String>, record: &Value) -> Suggestion {
    let empty = Value::Null;
    let data = record.get("data").unwrap_or(&empty);
    let summary = summarize_item(record);

    let title_tokens = tokens(str_field(data, "title").unwrap_or_default());
    let mut creator_tokens = BTreeSet::new();
    for creator in data.get("creators").and_then(Value::as_array).into_iter().flatten() {
        for field in ["lastName", "firstName", "name"] {
            if let Some(name) = str_field(creator, field) {
                creator_tokens.extend(tokens(name));
            }
        }
    }

    let matched_title: Vec<String> = query.intersection(&title_tokens).cloned().collect();
    let matched_creators: Vec<String> = query.intersection(&creator_tokens).cloned().collect();
    let doi = str_field(data, "DOI").or_else(|| str_field(data, "doi"));
    let doi_hit = doi.is_some_and(|d| {
        let d = d.to_lowercase();
        query.iter().any(|t| d.contains(t.as_str()))
    });

    let score = 2 * matched_title.len() as u32 + matched_creators.len() as u32 + u32::from(doi_hit);
    let matched_title: Vec<String> = matched_title.into_iter().take(MAX_MATCHES_SHOWN).collect();
    let matched_creators: Vec<String> = matched_creators.into_iter().take(MAX_MATCHES_SHOWN).collect();

    let mut rationale = Vec::new();
    if !matched_title.is_empty() {
        rationale.push(format!("title:{}", matched_title.join("/")));
    }
    if !matched_creators.is_empty() {
        rationale.push(format!("creator:{}", matched_creators.join("/")));
    }
    if doi.is_some() {
        rationale.push("doi".to_string());
    }

    Suggestion {
        key: summary.key,
        title: summary.title,
        creators: summary.creators,
        citekey: summary.citekey,
        score,
        matched_title,
        matched_creators,
        has_doi: doi.is_some(),
        rationale: rationale.join("; "),
    }
}

/// Rank records by score, then key; records repeated under one key count once.
pub fn rank(text: &str, records: &[Value], limit: usize) -> Vec<Suggestion> {
    let query = query_tokens(text);
    let mut seen = HashSet::new();
    let mut ranked: Vec<Suggestion> = records
        .iter()
        .filter(|r| r.is_object())
        .map(|r| score_item(&query, r))
        .filter(|s| s.key.is_empty() || seen.insert(s.key.clone()))
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(limit);
    ranked
}

/// Recent search results and suggestion candidates, plus the suggestion rate limit.
pub struct SuggestionCache {
    recent: TtlCache<Vec<Value>>,
    candidates: TtlCache<Vec<Value>>,
    limiter: RateLimiter,
}

impl SuggestionCache {
    pub fn new(cache: &CacheConfig) -> Self {
        Self {
            recent: TtlCache::new(cache.ttl, cache.max_entries),
            candidates: TtlCache::new(cache.ttl, cache.max_entries),
            limiter: RateLimiter::new(cache.rate_min_interval),
        }
    }

    pub fn remember_search(&self, query: &SearchQuery, records: &[Value]) {
        let key = format!(
            "search:{}:{}:{}:{}",
            query.mode.as_str(),
            query.limit,
            query.tag.as_deref().unwrap_or_default(),
            query.q.to_lowercase()
        );
        self.recent.insert(key, records.to_vec());
    }

    /// Every record from unexpired searches.
    pub fn local_pool(&self) -> Vec<Value> {
        self.recent.values().into_iter().flatten().collect()
    }

    pub fn candidates(&self, key: &str) -> Option<Vec<Value>> {
        self.candidates.get(key)
    }

    pub fn store_candidates(&self, key: impl Into<String>, records: Vec<Value>) {
        self.candidates.insert(key, records);
    }

    pub async fn throttle(&self) {
        self.limiter.acquire(RATE_BUCKET).await;
    }

    pub fn key(text: &str, mode: QueryMode, limit: u32) -> String {
        let text: String = text.trim().to_lowercase().chars().take(KEY_TEXT_CHARS).collect();
        format!("suggest:{}:{}:{}", mode.as_str(), limit, text)
    }
}
