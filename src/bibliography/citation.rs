// src/bibliography/citation.rs
// Citation formatting and citekey lookup against a bibliography

use super::csl::{CslEntry, duplicate_ids};
use crate::error::{Result, ZoteroMcpError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CitationStyle {
    /// `[see @a; @b, p. 4]`
    #[default]
    Pandoc,
    /// `\parencite[see][4]{a,b}`
    Latex,
}

#[derive(Debug, Clone, Default)]
pub struct CitationOptions {
    pub style: CitationStyle,
    pub prefix: Option<String>,
    /// Page number or a full locator such as "chap. 3"
    pub locator: Option<String>,
    pub suffix: Option<String>,
}

/// Format citekeys as citation markup.
pub fn format_citation(keys: &[String], options: &CitationOptions) -> Result<String> {
    let keys: Vec<&str> = keys
        .iter()
        .map(|k| k.trim().trim_start_matches('@'))
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        return Err(ZoteroMcpError::InputShape("No citekeys provided.".to_string()));
    }

    let prefix = non_empty(options.prefix.as_deref());
    let locator = non_empty(options.locator.as_deref());
    let suffix = non_empty(options.suffix.as_deref());

    Ok(match options.style {
        CitationStyle::Pandoc => {
            let mut inner = keys
                .iter()
                .map(|k| format!("@{}", k))
                .collect::<Vec<_>>()
                .join("; ");
            if let Some(loc) = locator {
                inner = format!("{}, {}", inner, pandoc_locator(loc));
            }
            if let Some(pre) = prefix {
                inner = format!("{} {}", pre, inner);
            }
            if let Some(suf) = suffix {
                inner = format!("{} {}", inner, suf);
            }
            format!("[{}]", inner)
        }
        CitationStyle::Latex => {
            let keys = keys.join(",");
            let post = match (locator, suffix) {
                (Some(l), Some(s)) => Some(format!("{} {}", l, s)),
                (Some(l), None) => Some(l.to_string()),
                (None, Some(s)) => Some(s.to_string()),
                (None, None) => None,
            };
            match (prefix, post) {
                (Some(pre), Some(post)) => format!("\\parencite[{}][{}]{{{}}}", pre, post, keys),
                (Some(pre), None) => format!("\\parencite[{}][]{{{}}}", pre, keys),
                (None, Some(post)) => format!("\\parencite[{}]{{{}}}", post, keys),
                (None, None) => format!("\\parencite{{{}}}", keys),
            }
        }
    })
}

/// Bare page numbers get a `p.` label; anything else is used verbatim.
fn pandoc_locator(locator: &str) -> String {
    if locator.starts_with(|c: char| c.is_ascii_digit()) {
        format!("p. {}", locator)
    } else {
        locator.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct ResolvedEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// "Family, Given" display names
    pub author: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedCitekeys {
    pub resolved: Vec<ResolvedEntry>,
    pub unresolved: Vec<String>,
    /// Keys repeated in the request
    pub duplicate_keys: Vec<String>,
}

/// Look up citekeys in a bibliography, keeping request order.
pub fn resolve_citekeys(keys: &[String], entries: &[CslEntry]) -> ResolvedCitekeys {
    let mut by_id: HashMap<&str, &CslEntry> = HashMap::new();
    for entry in entries {
        by_id.entry(entry.id.as_str()).or_insert(entry);
    }

    let keys: Vec<&str> = keys
        .iter()
        .map(|k| k.trim().trim_start_matches('@'))
        .filter(|k| !k.is_empty())
        .collect();

    let mut out = ResolvedCitekeys {
        duplicate_keys: duplicate_ids(keys.iter().copied()),
        ..Default::default()
    };
    let mut done = std::collections::HashSet::new();
    for key in keys {
        if !done.insert(key) {
            continue;
        }
        match by_id.get(key) {
            Some(entry) => out.resolved.push(ResolvedEntry {
                id: entry.id.clone(),
                title: entry.title.clone(),
                author: entry
                    .author
                    .iter()
                    .map(|a| a.display())
                    .filter(|a| !a.is_empty())
                    .collect(),
                issued: entry.issued.as_ref().and_then(issued_display),
                entry_type: entry.entry_type().map(str::to_string),
            }),
            None => out.unresolved.push(key.to_string()),
        }
    }
    out
}

/// Year (or full date parts) from a CSL date, else its raw/literal text.
pub fn issued_display(issued: &Value) -> Option<String> {
    match issued {
        Value::String(s) => Some(s.clone()).filter(|s| !s.trim().is_empty()),
        Value::Object(obj) => {
            let parts = obj
                .get("date-parts")
                .and_then(Value::as_array)
                .and_then(|p| p.first())
                .and_then(Value::as_array)
                .map(|first| {
                    first
                        .iter()
                        .map(|p| match p {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join("-")
                })
                .filter(|s| !s.is_empty());
            parts.or_else(|| {
                ["raw", "literal"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(Value::as_str).map(str::to_string))
            })
        }
        _ => None,
    }
}
