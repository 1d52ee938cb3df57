// src/bibliography/front_matter.rs
// YAML front matter: splitting, title lookup and citation key updates

use super::normalize::normalize_newlines;
use crate::error::{Result, ZoteroMcpError};
use serde::Serialize;
use serde_yaml::{Mapping, Value as Yaml};

/// Leading `---` block of a normalized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontMatter<'a> {
    /// YAML text between the markers, newline terminated unless empty
    pub yaml: &'a str,
    pub body: &'a str,
}

/// Split a `\n`-normalized document into front matter and body.
pub fn split_front_matter(text: &str) -> Option<FrontMatter<'_>> {
    let rest = text.strip_prefix("---\n")?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let bare = line.trim_end_matches('\n').trim_end();
        if bare == "---" || bare == "..." {
            return Some(FrontMatter {
                yaml: &rest[..offset],
                body: &rest[offset + line.len()..],
            });
        }
        offset += line.len();
    }
    None
}

fn parse_mapping(yaml: &str) -> Result<Mapping> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Yaml>(yaml)? {
        Yaml::Mapping(m) => Ok(m),
        Yaml::Null => Ok(Mapping::new()),
        _ => Err(ZoteroMcpError::InputShape(
            "Front matter must be a YAML mapping of key: value pairs.".to_string(),
        )),
    }
}

/// `title` from front matter, if it is a non-empty string.
pub fn front_matter_title(text: &str) -> Option<String> {
    let text = normalize_newlines(text);
    let fm = split_front_matter(&text)?;
    let mapping = parse_mapping(fm.yaml).ok()?;
    match mapping.get("title")? {
        Yaml::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Text of the first level-one ATX heading in the body.
pub fn first_heading(text: &str) -> Option<String> {
    let text = normalize_newlines(text);
    let body = split_front_matter(&text).map_or(text.as_str(), |fm| fm.body);
    body.lines().find_map(|line| {
        let rest = line.strip_prefix("# ")?;
        let heading = rest.trim().trim_end_matches('#').trim();
        (!heading.is_empty()).then(|| heading.to_string())
    })
}

#[derive(Debug, Clone, Default)]
pub struct YamlCitationOptions {
    pub bibliography: Option<String>,
    pub csl: Option<String>,
    pub link_citations: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct YamlCitationsUpdate {
    pub updated_content: String,
    pub changed: bool,
    pub keys_updated: Vec<String>,
    /// Other top-level keys already present, in document order
    pub preserved_keys: Vec<String>,
}

/// Insert or update `bibliography`, `csl` and `link-citations` in the front matter.
///
/// Only the affected top-level lines are rewritten, so comments and the
/// formatting of other keys survive.
pub fn ensure_yaml_citations(document: &str, options: &YamlCitationOptions) -> Result<YamlCitationsUpdate> {
    let text = normalize_newlines(document);
    let (yaml, body, had_front_matter) = match split_front_matter(&text) {
        Some(fm) => (fm.yaml.to_string(), fm.body.to_string(), true),
        None => (String::new(), text.clone(), false),
    };
    let mapping = parse_mapping(&yaml)?;

    let mut wanted: Vec<(&str, Yaml)> = Vec::new();
    if let Some(bib) = options.bibliography.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        wanted.push(("bibliography", Yaml::String(bib.to_string())));
    }
    if let Some(csl) = options.csl.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        wanted.push(("csl", Yaml::String(csl.to_string())));
    }
    if let Some(link) = options.link_citations {
        wanted.push(("link-citations", Yaml::Bool(link)));
    }

    let mut lines: Vec<String> = yaml.lines().map(str::to_string).collect();
    let mut keys_updated = Vec::new();
    for (key, value) in &wanted {
        if mapping.get(*key) == Some(value) {
            continue;
        }
        let rendered = render_entry(key, value)?;
        match top_level_block(&lines, key) {
            Some((start, end)) => {
                lines.splice(start..end, [rendered]);
            }
            None => lines.push(rendered),
        }
        keys_updated.push(key.to_string());
    }

    let preserved_keys = mapping
        .keys()
        .filter_map(Yaml::as_str)
        .filter(|k| !keys_updated.iter().any(|u| u == k))
        .map(str::to_string)
        .collect();

    if keys_updated.is_empty() {
        return Ok(YamlCitationsUpdate {
            updated_content: document.to_string(),
            changed: false,
            keys_updated,
            preserved_keys,
        });
    }

    let mut updated = String::from("---\n");
    for line in &lines {
        updated.push_str(line);
        updated.push('\n');
    }
    updated.push_str("---\n");
    if !had_front_matter && !body.is_empty() && !body.starts_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&body);

    Ok(YamlCitationsUpdate {
        updated_content: updated,
        changed: true,
        keys_updated,
        preserved_keys,
    })
}

/// `key: value` with YAML quoting applied to the value.
fn render_entry(key: &str, value: &Yaml) -> Result<String> {
    let mut single = Mapping::new();
    single.insert(Yaml::String(key.to_string()), value.clone());
    Ok(serde_yaml::to_string(&single)?.trim_end().to_string())
}

/// Line range of a top-level key including its indented continuation lines.
fn top_level_block(lines: &[String], key: &str) -> Option<(usize, usize)> {
    let start = lines.iter().position(|line| {
        line.strip_prefix(key)
            .is_some_and(|rest| rest.trim_start().starts_with(':'))
    })?;
    let mut end = start + 1;
    while end < lines.len() {
        let line = &lines[end];
        let continues = line.starts_with(' ') || line.starts_with('\t') || line.starts_with("- ");
        if !continues {
            break;
        }
        end += 1;
    }
    Some((start, end))
}
