// src/bibliography/validate.rs
// Cross-check document citekeys against a bibliography

use super::citekeys::extract_citekeys;
use super::csl::{CslEntry, duplicate_ids};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Minimum Jaro-Winkler similarity for a suggestion
const SUGGESTION_THRESHOLD: f64 = 0.75;
const MAX_SUGGESTIONS: usize = 3;

pub const MISSING_TITLE: &str = "title";
pub const MISSING_AUTHOR: &str = "author";
pub const MISSING_ISSUED: &str = "issued";
pub const MISSING_DOI_URL: &str = "DOI/URL";

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct MissingFields {
    pub id: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct Suggestion {
    pub id: String,
    pub score: f64,
}

/// Result of one validation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub unresolved_keys: Vec<String>,
    pub duplicate_keys: Vec<String>,
    pub missing_fields: Vec<MissingFields>,
    pub unused_entries: Vec<String>,
    /// Keys cited more than once in the document
    pub duplicate_citations: Vec<String>,
    pub suggestions: BTreeMap<String, Vec<Suggestion>>,
    pub citation_count: usize,
    pub entry_count: usize,
    pub notes: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.unresolved_keys.is_empty()
            && self.duplicate_keys.is_empty()
            && self.missing_fields.is_empty()
    }
}

/// Validate `document` citations against `entries` (raw, duplicates included).
pub fn validate_references(
    document: &str,
    entries: &[CslEntry],
    require_contact_fields: bool,
) -> ValidationReport {
    let extracted = extract_citekeys(document);
    let mut report = ValidationReport {
        duplicate_keys: duplicate_ids(entries.iter().map(|e| e.id.as_str())),
        missing_fields: missing_fields(entries, require_contact_fields),
        entry_count: entries.len(),
        ..Default::default()
    };

    // unique ids, first occurrence order
    let mut seen = HashSet::new();
    let bib_ids: Vec<&str> = entries
        .iter()
        .map(|e| e.id.as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    if extracted.is_empty() {
        report.notes.push(
            "No citations found. Keep footnotes or add [@key] citations for citation processing."
                .to_string(),
        );
        return report;
    }

    let cited = extracted.set();
    let known: HashSet<&str> = bib_ids.iter().copied().collect();

    report.citation_count = extracted.occurrences.len();
    report.unresolved_keys = extracted
        .ordered
        .iter()
        .filter(|k| !known.contains(k.as_str()))
        .cloned()
        .collect();
    report.unused_entries = bib_ids
        .iter()
        .filter(|id| !cited.contains(*id))
        .map(|id| id.to_string())
        .collect();
    report.duplicate_citations = extracted.repeated();

    for key in &report.unresolved_keys {
        let matches = suggest(key, &bib_ids);
        if !matches.is_empty() {
            report.suggestions.insert(key.clone(), matches);
        }
    }

    if bib_ids.is_empty() {
        report
            .notes
            .push("Bibliography is empty; every citation is unresolved.".to_string());
    }
    report
}

fn missing_fields(entries: &[CslEntry], require_contact_fields: bool) -> Vec<MissingFields> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert(e.id.as_str()))
        .filter_map(|entry| {
            let mut missing = Vec::new();
            if !entry.has_title() {
                missing.push(MISSING_TITLE.to_string());
            }
            if !entry.has_author() {
                missing.push(MISSING_AUTHOR.to_string());
            }
            if !entry.has_issued() {
                missing.push(MISSING_ISSUED.to_string());
            }
            if require_contact_fields && !entry.has_doi_or_url() {
                missing.push(MISSING_DOI_URL.to_string());
            }
            (!missing.is_empty()).then(|| MissingFields {
                id: entry.id.clone(),
                missing,
            })
        })
        .collect()
}

/// Closest bibliography ids to an unresolved key, best first.
fn suggest(key: &str, ids: &[&str]) -> Vec<Suggestion> {
    let needle = key.to_lowercase();
    let mut scored: Vec<Suggestion> = ids
        .iter()
        .map(|id| Suggestion {
            id: id.to_string(),
            score: strsim::jaro_winkler(&needle, &id.to_lowercase()),
        })
        .filter(|s| s.score >= SUGGESTION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(MAX_SUGGESTIONS);
    for s in &mut scored {
        s.score = (s.score * 1000.0).round() / 1000.0;
    }
    scored
}
