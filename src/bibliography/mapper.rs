// src/bibliography/mapper.rs
// Local CSL mapping for native Zotero item records

use super::csl::{CslEntry, CslName, DiagnosticCode};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"));

static ITEM_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{8}$").expect("valid regex"));

/// Result of mapping a batch of native records.
#[derive(Debug, Clone, Default)]
pub struct MappedRecords {
    /// In source order; the caller sorts
    pub entries: Vec<CslEntry>,
    pub diagnostics: Vec<(DiagnosticCode, String)>,
}

/// Where a mapped entry's id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdSource {
    Citekey,
    ItemKey,
}

/// Map native records to CSL entries.
///
/// When two records resolve to the same id the first record wins and the
/// collision is reported once.
pub fn map_records(records: &[Value]) -> MappedRecords {
    let mut out = MappedRecords::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut collided: Vec<String> = Vec::new();
    let mut skipped = 0usize;
    let mut key_ids = 0usize;
    let mut partial_authors = 0usize;

    for record in records {
        let Some(mapped) = map_record(record) else {
            skipped += 1;
            continue;
        };
        if !seen.insert(mapped.entry.id.clone()) {
            if !collided.contains(&mapped.entry.id) {
                collided.push(mapped.entry.id.clone());
            }
            continue;
        }
        if mapped.id_source == IdSource::ItemKey && ITEM_KEY_RE.is_match(&mapped.entry.id) {
            key_ids += 1;
        }
        if mapped.authors_partial {
            partial_authors += 1;
        }
        out.entries.push(mapped.entry);
    }

    if key_ids > 0 {
        out.diagnostics.push((
            DiagnosticCode::CslIdsFromZoteroKeys,
            format!(
                "CSL ids derived from Zotero item keys for {} entries; Better BibTeX citekeys not available.",
                key_ids
            ),
        ));
    }
    if partial_authors > 0 {
        out.diagnostics.push((
            DiagnosticCode::CslAuthorsPartial,
            format!(
                "{} records have creators that could not be mapped to CSL names.",
                partial_authors
            ),
        ));
    }
    if !collided.is_empty() {
        out.diagnostics.push((
            DiagnosticCode::CslIdCollision,
            format!(
                "Identifier collision for {}: kept the first record for each id.",
                collided.join(", ")
            ),
        ));
    }
    if skipped > 0 {
        out.diagnostics.push((
            DiagnosticCode::CslFallbackLocalMapping,
            format!("Skipped {} native records without an identifier.", skipped),
        ));
    }
    out
}

struct MappedRecord {
    entry: CslEntry,
    id_source: IdSource,
    authors_partial: bool,
}

fn map_record(record: &Value) -> Option<MappedRecord> {
    let top = record.as_object()?;
    // Web API items wrap fields in `data`; exported items are flat
    let data = top.get("data").and_then(Value::as_object).unwrap_or(top);

    let (id, id_source) = record_id(top, data)?;
    let mut entry = CslEntry::new(id);

    entry.title = str_field(data, "title");

    let (author, authors_partial) = map_creators(data.get("creators"));
    entry.author = author;

    entry.issued = str_field(data, "date")
        .or_else(|| match data.get("year") {
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        })
        .and_then(|date| issued_from_date(&date));

    if let Some(item_type) = str_field(data, "itemType") {
        entry
            .extra
            .insert("type".into(), Value::String(csl_type(&item_type).to_string()));
    }
    if let Some(doi) = str_field(data, "DOI") {
        entry.extra.insert("DOI".into(), Value::String(doi));
    }
    if let Some(url) = str_field(data, "url") {
        entry.extra.insert("URL".into(), Value::String(url));
    }

    Some(MappedRecord {
        entry,
        id_source,
        authors_partial,
    })
}

fn record_id(top: &Map<String, Value>, data: &Map<String, Value>) -> Option<(String, IdSource)> {
    if let Some(key) = str_field(data, "citekey").or_else(|| str_field(data, "citationKey")) {
        return Some((key, IdSource::Citekey));
    }
    if let Some(key) = str_field(data, "extra").and_then(|extra| citekey_from_extra(&extra)) {
        return Some((key, IdSource::Citekey));
    }
    if let Some(key) = str_field(top, "key").or_else(|| str_field(data, "key")) {
        return Some((key, IdSource::ItemKey));
    }
    match top.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some((s.trim().to_string(), IdSource::ItemKey)),
        Some(Value::Number(n)) => Some((n.to_string(), IdSource::ItemKey)),
        _ => None,
    }
}

/// Better BibTeX pins citekeys as a `Citation Key: xyz` line in Extra.
fn citekey_from_extra(extra: &str) -> Option<String> {
    extra.lines().find_map(|line| {
        let (label, value) = line.split_once(':')?;
        let label = label.trim().to_lowercase();
        if label == "citation key" || label == "citekey" {
            Some(value.trim().to_string()).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}

/// Returns the names and whether any creator was dropped.
fn map_creators(creators: Option<&Value>) -> (Vec<CslName>, bool) {
    let Some(Value::Array(creators)) = creators else {
        return (Vec::new(), false);
    };

    let mut names = Vec::new();
    let mut partial = false;
    for creator in creators {
        let Some(obj) = creator.as_object() else {
            partial = true;
            continue;
        };
        let family = str_field(obj, "lastName").or_else(|| str_field(obj, "family"));
        let given = str_field(obj, "firstName").or_else(|| str_field(obj, "given"));
        let literal = str_field(obj, "name").or_else(|| str_field(obj, "literal"));

        let name = if family.is_some() || given.is_some() {
            CslName {
                family,
                given,
                ..Default::default()
            }
        } else if literal.is_some() {
            CslName {
                literal,
                ..Default::default()
            }
        } else {
            partial = true;
            continue;
        };
        names.push(name);
    }
    (names, partial)
}

fn issued_from_date(date: &str) -> Option<Value> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    match YEAR_RE
        .captures(date)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
    {
        Some(year) => Some(json!({ "date-parts": [[year]] })),
        None => Some(json!({ "raw": date })),
    }
}

/// Zotero item type -> CSL type, unknown types pass through.
fn csl_type(item_type: &str) -> &str {
    match item_type {
        "journalArticle" => "article-journal",
        "magazineArticle" => "article-magazine",
        "newspaperArticle" => "article-newspaper",
        "bookSection" => "chapter",
        "conferencePaper" => "paper-conference",
        "webpage" => "webpage",
        "blogPost" => "post-weblog",
        "thesis" => "thesis",
        "report" => "report",
        "book" => "book",
        "preprint" => "article",
        other => other,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
