// src/zotero/records.rs
// Shaping native Zotero records for tool output

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub key: String,
    pub item_type: String,
    pub title: String,
    pub creators: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Better BibTeX citation key when the record carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citekey: Option<String>,
}

pub(crate) fn str_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

const NOTE_TITLE_CHARS: usize = 50;

pub fn summarize_item(record: &Value) -> ItemSummary {
    let empty = Value::Null;
    let data = record.get("data").unwrap_or(&empty);
    let key = str_field(record, "key")
        .or_else(|| str_field(data, "key"))
        .unwrap_or_default()
        .to_string();
    let item_type = str_field(data, "itemType").unwrap_or("unknown").to_string();

    let title = match (item_type.as_str(), str_field(data, "title")) {
        (_, Some(title)) => title.to_string(),
        ("note", None) => note_title(str_field(data, "note").unwrap_or_default()),
        _ => "(untitled)".to_string(),
    };

    let creators = data
        .get("creators")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|c| match (str_field(c, "lastName"), str_field(c, "firstName")) {
                    (Some(last), Some(first)) => Some(format!("{}, {}", last, first)),
                    (Some(last), None) => Some(last.to_string()),
                    _ => str_field(c, "name").map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();

    let citekey = str_field(data, "citationKey")
        .or_else(|| str_field(data, "citekey"))
        .map(str::to_string)
        .or_else(|| {
            str_field(data, "extra").and_then(|extra| {
                extra.lines().find_map(|l| {
                    l.trim()
                        .strip_prefix("Citation Key:")
                        .map(|k| k.trim().to_string())
                        .filter(|k| !k.is_empty())
                })
            })
        });

    ItemSummary {
        key,
        item_type,
        title,
        creators,
        date: str_field(data, "date").map(str::to_string),
        citekey,
    }
}

/// Note HTML reduced to whitespace-normalized text.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First line of a note's text with HTML tags removed.
fn note_title(html: &str) -> String {
    let first = strip_tags(html);
    if first.is_empty() {
        return "Note".to_string();
    }
    crate::utils::truncate(&first, NOTE_TITLE_CHARS)
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    #[serde(flatten)]
    pub summary: ItemSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_note: Option<String>,
    pub tags: Vec<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "ISBN", skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    #[serde(rename = "ISSN", skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,
    /// Plain text of a note item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Attachments and notes under the item
    pub num_children: u64,
}

/// Full metadata view of one native record.
pub fn item_details(record: &Value) -> ItemDetails {
    let empty = Value::Null;
    let data = record.get("data").unwrap_or(&empty);
    let summary = summarize_item(record);
    let note = (summary.item_type == "note")
        .then(|| str_field(data, "note").map(strip_tags))
        .flatten()
        .filter(|n| !n.is_empty());
    let tags = data
        .get("tags")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|t| str_field(t, "tag").or_else(|| t.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let num_children = record
        .get("meta")
        .and_then(|m| m.get("numChildren"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let field = |key: &str| str_field(data, key).map(str::to_string);

    ItemDetails {
        publication: field("publicationTitle").or_else(|| field("bookTitle")),
        abstract_note: field("abstractNote"),
        tags,
        doi: field("DOI"),
        url: field("url"),
        isbn: field("ISBN"),
        issn: field("ISSN"),
        note,
        num_children,
        summary,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub key: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

fn attachment_info(record: &Value) -> Option<AttachmentInfo> {
    let data = record.get("data")?;
    if str_field(data, "itemType") != Some("attachment") {
        return None;
    }
    Some(AttachmentInfo {
        key: str_field(record, "key").or_else(|| str_field(data, "key"))?.to_string(),
        content_type: str_field(data, "contentType")?.to_string(),
        filename: str_field(data, "filename").map(str::to_string),
    })
}

/// Attachment whose full text represents `item`: the item itself when it is an
/// attachment, otherwise the first PDF child, otherwise the first child with a content type.
pub fn pick_attachment(item: &Value, children: &[Value]) -> Option<AttachmentInfo> {
    if let Some(own) = attachment_info(item) {
        return Some(own);
    }
    let candidates: Vec<AttachmentInfo> = children.iter().filter_map(attachment_info).collect();
    candidates
        .iter()
        .find(|a| a.content_type == "application/pdf")
        .or_else(|| candidates.first())
        .cloned()
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionNode {
    pub key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    /// Names from the root, joined by `/`
    pub path: String,
    pub item_count: u64,
}

/// Flatten collection records into nodes with full paths, sorted by path.
///
/// `prefix` is prepended to every path (the parent's name when listing children).
pub fn collection_tree(records: &[Value], prefix: Option<&str>) -> Vec<CollectionNode> {
    let mut nodes: HashMap<String, CollectionNode> = HashMap::new();
    let mut order = Vec::new();
    for record in records {
        let data = record.get("data").unwrap_or(record);
        let Some(key) = str_field(data, "key").or_else(|| str_field(record, "key")) else {
            continue;
        };
        let name = str_field(data, "name").unwrap_or("(unnamed)").to_string();
        // parentCollection is `false` at top level
        let parent_key = str_field(data, "parentCollection").map(str::to_string);
        let item_count = record
            .get("meta")
            .and_then(|m| m.get("numItems"))
            .and_then(|n| n.as_u64().or_else(|| n.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(0);
        if nodes.contains_key(key) {
            continue;
        }
        order.push(key.to_string());
        nodes.insert(
            key.to_string(),
            CollectionNode {
                key: key.to_string(),
                path: name.clone(),
                name,
                parent_key,
                item_count,
            },
        );
    }

    let paths: HashMap<String, String> = order
        .iter()
        .map(|key| (key.clone(), path_of(key, &nodes)))
        .collect();

    let mut out: Vec<CollectionNode> = order
        .into_iter()
        .filter_map(|key| {
            let mut node = nodes.remove(&key)?;
            let path = paths.get(&key).cloned().unwrap_or_else(|| node.name.clone());
            node.path = match prefix {
                Some(p) => format!("{}/{}", p, path),
                None => path,
            };
            Some(node)
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.name.cmp(&b.name)));
    out
}

fn path_of(key: &str, nodes: &HashMap<String, CollectionNode>) -> String {
    let mut names = Vec::new();
    let mut current = Some(key.to_string());
    // bounded walk guards against parent cycles
    while let Some(k) = current {
        let Some(node) = nodes.get(&k) else { break };
        names.push(node.name.clone());
        if names.len() > nodes.len() {
            break;
        }
        current = node.parent_key.clone();
    }
    names.reverse();
    names.join("/")
}
