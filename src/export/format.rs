// src/export/format.rs
// Output formats, PDF engines and output basenames

use crate::bibliography::front_matter::{first_heading, front_matter_title};
use crate::error::{Result, ZoteroMcpError};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid regex"));

const MAX_BASENAME_CHARS: usize = 120;
pub const DEFAULT_BASENAME: &str = "document";

/// Document formats the build accepts. html-family output is not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Docx,
    Pdf,
    Odt,
    Rtf,
    Epub,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Docx,
        OutputFormat::Pdf,
        OutputFormat::Odt,
        OutputFormat::Rtf,
        OutputFormat::Epub,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Docx => "docx",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Odt => "odt",
            OutputFormat::Rtf => "rtf",
            OutputFormat::Epub => "epub",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().trim_start_matches('.').to_lowercase();
        Self::ALL.into_iter().find(|f| f.as_str() == value)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.as_str()).collect()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate requested formats, collapsing duplicates in request order.
///
/// Every unsupported value is named in a single error.
pub fn parse_formats(requested: &[String]) -> Result<Vec<OutputFormat>> {
    if requested.iter().all(|f| f.trim().is_empty()) {
        return Err(ZoteroMcpError::InputShape(
            "No output formats requested. Supported: docx, pdf, odt, rtf, epub.".to_string(),
        ));
    }

    let mut formats = Vec::new();
    let mut invalid = Vec::new();
    for raw in requested.iter().filter(|f| !f.trim().is_empty()) {
        match OutputFormat::parse(raw) {
            Some(format) if !formats.contains(&format) => formats.push(format),
            Some(_) => {}
            None => invalid.push(raw.trim().to_string()),
        }
    }

    if !invalid.is_empty() {
        return Err(ZoteroMcpError::UnsupportedFormat {
            requested: invalid,
            supported: OutputFormat::names(),
        });
    }
    Ok(formats)
}

/// PDF engines in default preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfEngine {
    Wkhtmltopdf,
    Weasyprint,
    Xelatex,
}

impl PdfEngine {
    pub const PREFERENCE: [PdfEngine; 3] =
        [PdfEngine::Wkhtmltopdf, PdfEngine::Weasyprint, PdfEngine::Xelatex];

    pub fn as_str(&self) -> &'static str {
        match self {
            PdfEngine::Wkhtmltopdf => "wkhtmltopdf",
            PdfEngine::Weasyprint => "weasyprint",
            PdfEngine::Xelatex => "xelatex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::PREFERENCE.into_iter().find(|e| e.as_str() == value)
    }

    /// Engine whose binary name prefixes a file name (`xelatex.exe`, `weasyprint-62`).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        Self::PREFERENCE
            .into_iter()
            .find(|e| name.starts_with(e.as_str()))
    }

    pub fn names() -> Vec<&'static str> {
        Self::PREFERENCE.iter().map(|e| e.as_str()).collect()
    }
}

impl fmt::Display for PdfEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduce a name to `[A-Za-z0-9._-]`, at most 120 characters.
pub fn sanitize_basename(name: &str) -> String {
    let replaced = UNSAFE_CHARS_RE.replace_all(name.trim(), "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == '_' || c == '-');
    let mut out: String = trimmed.chars().take(MAX_BASENAME_CHARS).collect();
    out = out
        .trim_end_matches(|c| c == '.' || c == '_' || c == '-')
        .to_string();
    if out.is_empty() {
        DEFAULT_BASENAME.to_string()
    } else {
        out
    }
}

/// Explicit name, else front matter title, else first heading, else "document".
pub fn derive_basename(explicit: Option<&str>, document: &str) -> String {
    let candidate = explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            // drop an extension the caller may have included
            OutputFormat::ALL
                .iter()
                .find_map(|f| s.strip_suffix(&format!(".{}", f.extension())))
                .unwrap_or(s)
                .to_string()
        })
        .or_else(|| front_matter_title(document))
        .or_else(|| first_heading(document));
    match candidate {
        Some(name) => sanitize_basename(&name),
        None => DEFAULT_BASENAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_formats_dedups_in_order() {
        let formats = parse_formats(&strings(&["PDF", "docx", "pdf"])).unwrap();
        assert_eq!(formats, vec![OutputFormat::Pdf, OutputFormat::Docx]);
    }

    #[test]
    fn test_parse_formats_names_every_invalid_value() {
        let err = parse_formats(&strings(&["docx", "html", "xyz"])).unwrap_err();
        match err {
            ZoteroMcpError::UnsupportedFormat { requested, .. } => {
                assert_eq!(requested, vec!["html", "xyz"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_formats_empty_is_input_error() {
        assert!(matches!(
            parse_formats(&[]).unwrap_err(),
            ZoteroMcpError::InputShape(_)
        ));
        assert!(matches!(
            parse_formats(&strings(&[" "])).unwrap_err(),
            ZoteroMcpError::InputShape(_)
        ));
    }

    #[test]
    fn test_html_family_rejected() {
        for f in ["html", "html5", "revealjs"] {
            assert!(parse_formats(&strings(&[f])).is_err(), "{f}");
        }
    }

    #[test]
    fn test_pdf_engine_parsing() {
        assert_eq!(PdfEngine::parse("XeLaTeX"), Some(PdfEngine::Xelatex));
        assert_eq!(PdfEngine::parse("chrome"), None);
        assert_eq!(
            PdfEngine::from_file_name("weasyprint-62.exe"),
            Some(PdfEngine::Weasyprint)
        );
    }

    #[test]
    fn test_sanitize_basename() {
        assert_eq!(sanitize_basename("My Paper: Draft #2"), "My_Paper_Draft_2");
        assert_eq!(sanitize_basename("..hidden.."), "hidden");
        assert_eq!(sanitize_basename("***"), "document");
        assert_eq!(sanitize_basename(&"a".repeat(200)).len(), 120);
        assert_eq!(sanitize_basename("../../etc/passwd"), "etc_passwd");
    }

    #[test]
    fn test_derive_basename_priority() {
        let doc = "---\ntitle: From Title\n---\n# From Heading\n";
        assert_eq!(derive_basename(Some("explicit.docx"), doc), "explicit");
        assert_eq!(derive_basename(None, doc), "From_Title");
        assert_eq!(derive_basename(None, "# From Heading\ntext"), "From_Heading");
        assert_eq!(derive_basename(Some("  "), "plain text"), "document");
    }
}
