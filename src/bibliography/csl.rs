// src/bibliography/csl.rs
// Canonical CSL-JSON entries and classification of bibliography payloads

use super::mapper;
use super::normalize::shape_name;
use crate::error::{Result, ZoteroMcpError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// A bibliography as supplied by a caller or the reference manager.
#[derive(Debug, Clone, PartialEq)]
pub enum BibliographyPayload {
    /// Serialized CSL-JSON
    Text(String),
    /// Already parsed value
    Structured(Value),
}

impl BibliographyPayload {
    /// Accept a tool argument. `null` means no payload; scalars are rejected.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(BibliographyPayload::Text(s))),
            v @ (Value::Array(_) | Value::Object(_)) => Ok(Some(BibliographyPayload::Structured(v))),
            other => Err(ZoteroMcpError::InputShape(format!(
                "Unsupported bibliography payload: pass CSL-JSON text or a parsed array/object, received {}.",
                shape_name(&other)
            ))),
        }
    }
}

/// Machine-readable diagnostics attached to a normalized bibliography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    InvalidCslExport,
    CslFallbackLocalMapping,
    CslIdsFromZoteroKeys,
    CslAuthorsPartial,
    CslIdCollision,
    CslDuplicateIds,
    EmptyBibliography,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCslExport => "INVALID_CSL_EXPORT",
            Self::CslFallbackLocalMapping => "CSL_FALLBACK_LOCAL_MAPPING",
            Self::CslIdsFromZoteroKeys => "CSL_IDS_FROM_ZOTERO_KEYS",
            Self::CslAuthorsPartial => "CSL_AUTHORS_PARTIAL",
            Self::CslIdCollision => "CSL_ID_COLLISION",
            Self::CslDuplicateIds => "CSL_DUPLICATE_IDS",
            Self::EmptyBibliography => "EMPTY_BIBLIOGRAPHY",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CSL name: `{family, given}` or `{literal}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
pub struct CslName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CslName {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut extra = obj.clone();
        let mut take = |key: &str| {
            let value = extra.get(key).and_then(Value::as_str).map(str::to_string)?;
            extra.remove(key);
            Some(value).filter(|s| !s.trim().is_empty())
        };
        let family = take("family");
        let given = take("given");
        let literal = take("literal");
        Self {
            family,
            given,
            literal,
            extra,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.family.is_none() && self.given.is_none() && self.literal.is_none()
    }

    /// "Family, Given" / literal / whichever part exists.
    pub fn display(&self) -> String {
        match (&self.family, &self.given, &self.literal) {
            (Some(f), Some(g), _) => format!("{}, {}", f, g),
            (Some(f), None, _) => f.clone(),
            (None, _, Some(l)) => l.clone(),
            (None, Some(g), None) => g.clone(),
            (None, None, None) => String::new(),
        }
    }
}

/// One validated bibliography entry.
///
/// Fields other than the four tracked ones are carried through in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct CslEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CslName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CslEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            author: Vec::new(),
            issued: None,
            extra: Map::new(),
        }
    }

    /// Parse an object carrying a non-empty string `id`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id")?.as_str()?.trim();
        if id.is_empty() {
            return None;
        }

        let mut entry = CslEntry::new(id);
        for (key, val) in obj {
            match (key.as_str(), val) {
                ("id", _) => {}
                ("title", Value::String(s)) => entry.title = Some(s.clone()),
                ("author", Value::Array(names)) if names.iter().all(Value::is_object) => {
                    entry.author = names
                        .iter()
                        .filter_map(Value::as_object)
                        .map(CslName::from_object)
                        .collect();
                }
                ("issued", v) if !v.is_null() => entry.issued = Some(v.clone()),
                _ => {
                    entry.extra.insert(key.clone(), val.clone());
                }
            }
        }
        Some(entry)
    }

    pub fn has_title(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_author(&self) -> bool {
        self.author.iter().any(|a| !a.is_empty())
    }

    /// Structured date parts, a raw date string, or a literal.
    pub fn has_issued(&self) -> bool {
        match &self.issued {
            Some(Value::Object(obj)) => {
                let parts = obj
                    .get("date-parts")
                    .and_then(Value::as_array)
                    .and_then(|p| p.first())
                    .and_then(Value::as_array)
                    .is_some_and(|first| !first.is_empty());
                let text = ["raw", "literal"].iter().any(|k| {
                    obj.get(*k)
                        .and_then(Value::as_str)
                        .is_some_and(|s| !s.trim().is_empty())
                });
                parts || text
            }
            Some(Value::String(s)) => !s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn has_doi_or_url(&self) -> bool {
        ["DOI", "URL"].iter().any(|k| {
            self.extra
                .get(*k)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty())
        })
    }

    pub fn entry_type(&self) -> Option<&str> {
        self.extra.get("type").and_then(Value::as_str)
    }

    fn sort_key(&self) -> (&str, &str) {
        (self.id.as_str(), self.title.as_deref().unwrap_or(""))
    }
}

/// Classification of a payload before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum BibliographyShape {
    /// Every entry is an object with a string id
    WellFormed(Vec<CslEntry>),
    /// Entries have to be synthesized from native records; `reason` is `None` when no
    /// payload was given. `partial` holds the entries that did carry a string id.
    NeedsSynthesis {
        reason: Option<String>,
        partial: Vec<CslEntry>,
    },
    /// A valid, empty array
    Empty,
}

impl BibliographyShape {
    pub fn needs_synthesis(&self) -> bool {
        matches!(self, BibliographyShape::NeedsSynthesis { .. })
    }

    fn invalid(reason: impl Into<String>) -> Self {
        BibliographyShape::NeedsSynthesis {
            reason: Some(reason.into()),
            partial: Vec::new(),
        }
    }
}

pub fn classify(payload: &BibliographyPayload) -> BibliographyShape {
    match payload {
        BibliographyPayload::Text(text) => classify_text(text),
        BibliographyPayload::Structured(value) => classify_value(value),
    }
}

fn classify_text(text: &str) -> BibliographyShape {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    match serde_json::from_str::<Value>(text) {
        Ok(value) => classify_value(&value),
        Err(e) => BibliographyShape::invalid(format!("not JSON parseable ({})", e)),
    }
}

fn classify_value(value: &Value) -> BibliographyShape {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("items") {
            Some(Value::Array(items)) => items,
            _ => {
                return BibliographyShape::invalid(
                    "unexpected JSON shape (expected array or object with 'items')",
                );
            }
        },
        Value::String(text) => return classify_text(text),
        other => {
            return BibliographyShape::invalid(format!(
                "unexpected JSON shape ({}; expected array or object with 'items')",
                shape_name(other)
            ));
        }
    };

    if items.is_empty() {
        return BibliographyShape::Empty;
    }
    if items.iter().all(Value::is_string) {
        return BibliographyShape::invalid("array of strings instead of CSL entries");
    }

    let entries: Vec<CslEntry> = items.iter().filter_map(CslEntry::from_value).collect();
    if entries.len() != items.len() {
        return BibliographyShape::NeedsSynthesis {
            reason: Some(format!(
                "{} of {} entries missing string 'id'; downstream citeproc may fail",
                items.len() - entries.len(),
                items.len()
            )),
            partial: entries,
        };
    }
    BibliographyShape::WellFormed(entries)
}

/// Canonical bibliography plus everything noticed on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedBibliography {
    pub entries: Vec<CslEntry>,
    pub warnings: Vec<String>,
    pub codes: Vec<DiagnosticCode>,
}

impl NormalizedBibliography {
    pub(crate) fn note(&mut self, code: DiagnosticCode, warning: impl Into<String>) {
        if !self.codes.contains(&code) {
            self.codes.push(code);
        }
        self.warnings.push(warning.into());
    }

    /// Serialized entries as CSL-JSON text, stable across calls.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Entry ids in the order they occur, duplicates included.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

/// Validate `payload`, synthesizing from `fallback` native records when needed.
///
/// Never fails: unusable input yields an empty bibliography with warnings.
pub fn normalize_bibliography(
    payload: Option<&BibliographyPayload>,
    fallback: Option<&[Value]>,
) -> NormalizedBibliography {
    let shape = match payload {
        Some(payload) => classify(payload),
        None => BibliographyShape::NeedsSynthesis {
            reason: None,
            partial: Vec::new(),
        },
    };
    normalize_shape(shape, fallback)
}

/// Second half of [`normalize_bibliography`] for callers that fetch fallback records lazily.
pub fn normalize_shape(shape: BibliographyShape, fallback: Option<&[Value]>) -> NormalizedBibliography {
    let mut out = NormalizedBibliography::default();

    match shape {
        BibliographyShape::WellFormed(entries) => {
            out.entries = entries;
            let dups = duplicate_ids(out.entries.iter().map(|e| e.id.as_str()));
            if !dups.is_empty() {
                out.note(
                    DiagnosticCode::CslDuplicateIds,
                    format!("Duplicate CSL ids in bibliography: {}", dups.join(", ")),
                );
            }
        }
        BibliographyShape::Empty => {
            out.note(
                DiagnosticCode::EmptyBibliography,
                "Bibliography is an empty array; no entries to validate.",
            );
        }
        BibliographyShape::NeedsSynthesis { reason, partial } => {
            if let Some(reason) = &reason {
                out.note(
                    DiagnosticCode::InvalidCslExport,
                    format!("Invalid CSL export: {}", reason),
                );
            }
            match fallback {
                Some(records) if !records.is_empty() => {
                    let mapped = mapper::map_records(records);
                    out.note(
                        DiagnosticCode::CslFallbackLocalMapping,
                        format!(
                            "Built CSL-JSON locally from {} native records ({} entries); \
                             synthesized ids may not match the citation keys in your document.",
                            records.len(),
                            mapped.entries.len()
                        ),
                    );
                    for (code, warning) in mapped.diagnostics {
                        out.note(code, warning);
                    }
                    out.entries = mapped.entries;
                }
                _ if !partial.is_empty() => {
                    out.warnings.push(format!(
                        "Kept {} entr{} with string ids; entries without an id were dropped.",
                        partial.len(),
                        if partial.len() == 1 { "y" } else { "ies" }
                    ));
                    out.entries = partial;
                    let dups = duplicate_ids(out.entries.iter().map(|e| e.id.as_str()));
                    if !dups.is_empty() {
                        out.note(
                            DiagnosticCode::CslDuplicateIds,
                            format!("Duplicate CSL ids in bibliography: {}", dups.join(", ")),
                        );
                    }
                }
                _ if reason.is_some() => {
                    out.warnings.push(
                        "No native records available for fallback mapping; bibliography is empty."
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
    }

    out.entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    out
}

/// Ids occurring more than once, each reported once, in first-seen order.
pub fn duplicate_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order = Vec::new();
    for id in ids {
        let count = counts.entry(id).or_insert(0);
        *count += 1;
        if *count == 2 {
            order.push(id.to_string());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(s: &str) -> BibliographyPayload {
        BibliographyPayload::Text(s.to_string())
    }

    // ============================================================================
    // Classification
    // ============================================================================

    #[test]
    fn test_classify_well_formed_array() {
        let shape = classify(&text(r#"[{"id":"a","title":"A"}]"#));
        match shape {
            BibliographyShape::WellFormed(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].id, "a");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_items_object() {
        let value = json!({"items": [{"id": "a"}]});
        assert!(matches!(
            classify(&BibliographyPayload::Structured(value)),
            BibliographyShape::WellFormed(_)
        ));
    }

    #[test]
    fn test_classify_empty_array() {
        assert_eq!(classify(&text("[]")), BibliographyShape::Empty);
    }

    #[test]
    fn test_classify_needs_synthesis() {
        assert!(classify(&text("<html>502</html>")).needs_synthesis());
        assert!(classify(&text(r#"["items"]"#)).needs_synthesis());
        assert!(classify(&text(r#"[{"title":"no id"}]"#)).needs_synthesis());
        assert!(classify(&text(r#"{"data": 1}"#)).needs_synthesis());
        assert!(classify(&text("42")).needs_synthesis());
    }

    #[test]
    fn test_classify_nested_json_string() {
        let value = json!(r#"[{"id":"a"}]"#);
        assert!(matches!(
            classify(&BibliographyPayload::Structured(value)),
            BibliographyShape::WellFormed(_)
        ));
    }

    #[test]
    fn test_payload_from_value_rejects_scalars() {
        assert!(BibliographyPayload::from_value(Value::Null).unwrap().is_none());
        let err = BibliographyPayload::from_value(json!(3)).unwrap_err();
        assert!(err.to_string().contains("received number"));
        let err = BibliographyPayload::from_value(json!(true)).unwrap_err();
        assert!(err.to_string().contains("received boolean"));
    }

    // ============================================================================
    // Entries
    // ============================================================================

    #[test]
    fn test_entry_keeps_unknown_fields() {
        let entry = CslEntry::from_value(&json!({
            "id": "a",
            "title": "T",
            "container-title": "J",
            "DOI": "10.1/x",
            "author": [{"family": "Doe", "given": "J", "dropping-particle": "van"}]
        }))
        .unwrap();
        assert_eq!(entry.extra["container-title"], "J");
        assert!(entry.has_doi_or_url());
        assert_eq!(entry.author[0].extra["dropping-particle"], "van");
        assert_eq!(entry.author[0].display(), "Doe, J");
    }

    #[test]
    fn test_entry_issued_variants() {
        let parts = CslEntry::from_value(&json!({"id": "a", "issued": {"date-parts": [[2020]]}}));
        assert!(parts.unwrap().has_issued());
        let raw = CslEntry::from_value(&json!({"id": "a", "issued": {"raw": "2020"}}));
        assert!(raw.unwrap().has_issued());
        let empty = CslEntry::from_value(&json!({"id": "a", "issued": {"date-parts": [[]]}}));
        assert!(!empty.unwrap().has_issued());
    }

    #[test]
    fn test_entry_requires_non_empty_id() {
        assert!(CslEntry::from_value(&json!({"id": ""})).is_none());
        assert!(CslEntry::from_value(&json!({"id": 5})).is_none());
        assert!(CslEntry::from_value(&json!("a")).is_none());
    }

    // ============================================================================
    // normalize_bibliography
    // ============================================================================

    #[test]
    fn test_normalize_sorts_by_id_then_title() {
        let out = normalize_bibliography(
            Some(&text(r#"[{"id":"b"},{"id":"a","title":"Z"},{"id":"a","title":"M"}]"#)),
            None,
        );
        let order: Vec<_> = out
            .entries
            .iter()
            .map(|e| (e.id.as_str(), e.title.as_deref()))
            .collect();
        assert_eq!(order, vec![("a", Some("M")), ("a", Some("Z")), ("b", None)]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let payload = text(r#"[{"id":"b","title":"B","x":1},{"id":"a","title":"A"}]"#);
        let first = normalize_bibliography(Some(&payload), None);
        let again = normalize_bibliography(
            Some(&BibliographyPayload::Text(first.to_json().unwrap())),
            None,
        );
        assert_eq!(first.entries, again.entries);
        assert_eq!(first.to_json().unwrap(), again.to_json().unwrap());
    }

    #[test]
    fn test_normalize_flags_duplicate_ids_once() {
        let out = normalize_bibliography(
            Some(&text(r#"[{"id":"a"},{"id":"a"},{"id":"a"},{"id":"b"}]"#)),
            None,
        );
        assert_eq!(out.entries.len(), 4);
        assert_eq!(out.codes, vec![DiagnosticCode::CslDuplicateIds]);
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].ends_with(": a"));
    }

    #[test]
    fn test_normalize_empty_array_warns() {
        let out = normalize_bibliography(Some(&text("[]")), None);
        assert!(out.entries.is_empty());
        assert_eq!(out.codes, vec![DiagnosticCode::EmptyBibliography]);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn test_normalize_unparseable_without_fallback_is_empty() {
        let out = normalize_bibliography(Some(&text("Bad Gateway")), None);
        assert!(out.entries.is_empty());
        assert!(out.codes.contains(&DiagnosticCode::InvalidCslExport));
        assert!(out.warnings.len() >= 2);
    }

    #[test]
    fn test_normalize_without_payload_or_fallback_is_silent() {
        let out = normalize_bibliography(None, None);
        assert!(out.entries.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_normalize_falls_back_to_native_records() {
        let records = vec![
            json!({"key": "K2", "data": {"citekey": "smith2020", "title": "S"}}),
            json!({"key": "K1", "data": {"citekey": "doe2019", "title": "D"}}),
        ];
        let out = normalize_bibliography(Some(&text(r#"["items"]"#)), Some(&records));
        let ids: Vec<_> = out.ids().collect();
        assert_eq!(ids, vec!["doe2019", "smith2020"]);
        assert!(out.codes.contains(&DiagnosticCode::InvalidCslExport));
        assert!(out.codes.contains(&DiagnosticCode::CslFallbackLocalMapping));
    }

    #[test]
    fn test_mixed_ids_keep_entries_that_have_one() {
        let payload = text(r#"[{"id":"k2","title":"B"},{"title":"no id"},{"id":"k1","title":"A"}]"#);
        match classify(&payload) {
            BibliographyShape::NeedsSynthesis { reason, partial } => {
                assert!(reason.unwrap().starts_with("1 of 3"));
                assert_eq!(partial.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        let out = normalize_bibliography(Some(&payload), None);
        let ids: Vec<_> = out.ids().collect();
        assert_eq!(ids, vec!["k1", "k2"]);
        assert_eq!(out.codes, vec![DiagnosticCode::InvalidCslExport]);
        assert!(out.warnings.iter().any(|w| w.contains("Kept 2 entries")));
        assert!(!out.warnings.iter().any(|w| w.contains("bibliography is empty")));
    }

    #[test]
    fn test_native_records_replace_partial_entries() {
        let records = vec![json!({"key": "K1", "data": {"citekey": "doe2019", "title": "D"}})];
        let out = normalize_bibliography(
            Some(&text(r#"[{"id":"k1"},{"title":"no id"}]"#)),
            Some(&records),
        );
        let ids: Vec<_> = out.ids().collect();
        assert_eq!(ids, vec!["doe2019"]);
    }

    #[test]
    fn test_synthesis_warning_mentions_citation_keys() {
        let records = vec![json!({"key": "K1", "data": {"citekey": "doe2019", "title": "D"}})];
        let out = normalize_bibliography(None, Some(&records));
        assert_eq!(out.codes, vec![DiagnosticCode::CslFallbackLocalMapping]);
        assert!(out.warnings[0].contains("may not match the citation keys"));
    }

    #[test]
    fn test_duplicate_ids_first_seen_order() {
        let dups = duplicate_ids(["b", "a", "b", "a", "b"].into_iter());
        assert_eq!(dups, vec!["b", "a"]);
    }
}
