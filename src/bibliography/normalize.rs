// src/bibliography/normalize.rs
// Text and path normalization for caller and upstream payloads

use crate::config::PathConfig;
use crate::error::{Result, ZoteroMcpError};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Text as it arrives from callers or the reference manager.
#[derive(Debug, Clone, PartialEq)]
pub enum RawText {
    Bytes(Vec<u8>),
    Text(String),
    /// Ordered pieces, joined with a blank line
    Fragments(Vec<String>),
}

impl From<String> for RawText {
    fn from(s: String) -> Self {
        RawText::Text(s)
    }
}

impl From<&str> for RawText {
    fn from(s: &str) -> Self {
        RawText::Text(s.to_string())
    }
}

impl From<Vec<u8>> for RawText {
    fn from(b: Vec<u8>) -> Self {
        RawText::Bytes(b)
    }
}

/// Produce one `\n`-terminated-lines text value without a leading BOM.
///
/// Bytes are decoded as UTF-8, replacing invalid sequences.
pub fn normalize_text(raw: RawText) -> String {
    match raw {
        RawText::Bytes(bytes) => normalize_newlines(&String::from_utf8_lossy(&bytes)),
        RawText::Text(text) => normalize_newlines(&text),
        RawText::Fragments(parts) => normalize_newlines(&parts.join("\n\n")),
    }
}

/// Strip a leading BOM and convert CRLF / CR line endings to LF.
pub fn normalize_newlines(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Name of a JSON value's shape, for error messages.
pub fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a dynamically typed text payload (string or array of strings).
pub fn text_from_value(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(normalize_text(RawText::Text(s.clone()))),
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => parts.push(s.clone()),
                    other => {
                        return Err(ZoteroMcpError::InputShape(format!(
                            "Unsupported text fragment: expected string, received {}.",
                            shape_name(other)
                        )));
                    }
                }
            }
            Ok(normalize_text(RawText::Fragments(parts)))
        }
        other => Err(ZoteroMcpError::InputShape(format!(
            "Unsupported input type: expected text or a list of text fragments, received {}.",
            shape_name(other)
        ))),
    }
}

/// Map a caller-supplied path onto this host.
///
/// Windows drive paths map under the drives root on non-Windows hosts, `~`
/// expands to the home directory and relative paths resolve against the
/// configured documents base.
pub fn normalize_path(input: &str, config: &PathConfig) -> PathBuf {
    let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'');

    if !cfg!(windows)
        && let Some((drive, rest)) = split_drive(trimmed)
    {
        let root = config
            .host_drives_root
            .clone()
            .or_else(default_drives_root)
            .unwrap_or_else(|| PathBuf::from("/"));
        let rest = rest.replace('\\', "/");
        let mut path = root.join(drive.to_ascii_lowercase().to_string());
        for part in rest.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        return path;
    }

    let expanded = expand_home(trimmed);
    if expanded.is_relative()
        && let Some(base) = &config.docs_base
    {
        return base.join(expanded);
    }
    expanded
}

/// `C:\foo` or `c:/foo` -> ('c', "\foo")
fn split_drive(path: &str) -> Option<(char, &str)> {
    let mut chars = path.chars();
    let drive = chars.next()?;
    if !drive.is_ascii_alphabetic() || chars.next()? != ':' {
        return None;
    }
    let rest = &path[2..];
    if rest.starts_with('\\') || rest.starts_with('/') {
        Some((drive, rest))
    } else {
        None
    }
}

fn default_drives_root() -> Option<PathBuf> {
    ["/host_mnt", "/mnt"]
        .iter()
        .map(Path::new)
        .find(|p| p.is_dir())
        .map(Path::to_path_buf)
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ============================================================================
    // Text
    // ============================================================================

    #[test]
    fn test_strips_bom_and_crlf() {
        let out = normalize_text(RawText::Text("\u{feff}a\r\nb\rc\n".into()));
        assert_eq!(out, "a\nb\nc\n");
    }

    #[test]
    fn test_bytes_replace_invalid_utf8() {
        let out = normalize_text(RawText::Bytes(vec![b'o', b'k', 0xff, b'\r', b'\n']));
        assert_eq!(out, "ok\u{fffd}\n");
    }

    #[test]
    fn test_fragments_join_with_blank_line() {
        let out = normalize_text(RawText::Fragments(vec!["a".into(), "b\r\n".into()]));
        assert_eq!(out, "a\n\nb\n");
    }

    #[test]
    fn test_text_from_value_accepts_string_and_list() {
        assert_eq!(text_from_value(&json!("x\r\ny")).unwrap(), "x\ny");
        assert_eq!(text_from_value(&json!(["a", "b"])).unwrap(), "a\n\nb");
    }

    #[test]
    fn test_text_from_value_names_received_shape() {
        let err = text_from_value(&json!({"a": 1})).unwrap_err();
        assert!(err.to_string().contains("received object"));

        let err = text_from_value(&json!(["a", 3])).unwrap_err();
        assert!(err.to_string().contains("received number"));
    }

    // ============================================================================
    // Paths
    // ============================================================================

    #[cfg(unix)]
    #[test]
    fn test_windows_drive_maps_under_root() {
        let config = PathConfig {
            host_drives_root: Some(PathBuf::from("/host")),
            docs_base: None,
        };
        let out = normalize_path(r"C:\Users\me\paper.md", &config);
        assert_eq!(out, PathBuf::from("/host/c/Users/me/paper.md"));

        let out = normalize_path("\"d:/work/x.md\"", &config);
        assert_eq!(out, PathBuf::from("/host/d/work/x.md"));
    }

    #[test]
    fn test_relative_path_uses_docs_base() {
        let config = PathConfig {
            host_drives_root: None,
            docs_base: Some(PathBuf::from("/docs")),
        };
        assert_eq!(
            normalize_path("drafts/a.md", &config),
            PathBuf::from("/docs/drafts/a.md")
        );
        assert_eq!(normalize_path("/abs/a.md", &config), PathBuf::from("/abs/a.md"));
    }

    #[test]
    fn test_home_expansion() {
        let config = PathConfig::default();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(normalize_path("~/a.md", &config), home.join("a.md"));
        }
    }

    #[test]
    fn test_split_drive_rejects_non_drive() {
        assert!(split_drive("C:relative").is_none());
        assert!(split_drive("/usr/bin").is_none());
        assert!(split_drive("1:/x").is_none());
    }
}
