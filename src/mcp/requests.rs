// src/mcp/requests.rs
// MCP tool request types

use crate::bibliography::citation::CitationStyle;
use crate::zotero::{ExportFormat, QueryMode};
use rmcp::schemars;
use serde::Deserialize;
use serde_json::Value;

// ============================================================================
// Scope enums
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportScopeKind {
    /// Whole library
    #[default]
    Library,
    /// One collection (requires collectionKey)
    Collection,
}

// ============================================================================
// Bibliography
// ============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeBibliographyRequest {
    #[schemars(description = "CSL-JSON as text, or an already parsed array/object")]
    pub bibliography_content: Option<Value>,
    #[schemars(
        description = "Native Zotero item records used when the bibliography is missing or not CSL-JSON"
    )]
    pub fallback_records: Option<Vec<Value>>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReferencesRequest {
    #[schemars(description = "Markdown text (string or list of fragments)")]
    pub document_content: Option<Value>,
    #[schemars(description = "Markdown file on the server, used when documentContent is absent")]
    pub document_path: Option<String>,
    #[schemars(description = "CSL-JSON as text, or an already parsed array/object")]
    pub bibliography_content: Option<Value>,
    #[serde(rename = "requireDOIURL")]
    #[schemars(description = "Report entries with neither DOI nor URL (default: true)")]
    pub require_doi_url: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportBibliographyRequest {
    #[schemars(description = "csljson (default), bibtex or biblatex")]
    pub format: Option<ExportFormat>,
    #[schemars(description = "library (default) or collection")]
    pub scope: Option<ExportScopeKind>,
    #[schemars(description = "Collection key when scope is collection")]
    pub collection_key: Option<String>,
    #[schemars(description = "Page size, 1-100 (default: 100)")]
    pub limit: Option<u32>,
    #[schemars(description = "Follow pagination until every item is fetched (default: true)")]
    pub fetch_all: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveCitekeysRequest {
    pub citekeys: Vec<String>,
    #[schemars(description = "CSL-JSON as text, or an already parsed array/object")]
    pub bibliography_content: Option<Value>,
}

// ============================================================================
// Citations / front matter / styles
// ============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InsertCitationRequest {
    pub citekeys: Vec<String>,
    #[schemars(description = "pandoc (default) or latex")]
    pub style: Option<CitationStyle>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    #[schemars(description = "Page number(s) or a locator such as 'chap. 3'")]
    pub pages: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnsureYamlCitationsRequest {
    #[schemars(description = "Markdown text (string or list of fragments)")]
    pub document_content: Value,
    #[schemars(description = "Value for the bibliography key")]
    pub bibliography_content: Option<String>,
    #[schemars(description = "Value for the csl key")]
    pub csl_content: Option<String>,
    #[schemars(description = "Value for link-citations (default: true)")]
    pub link_citations: Option<bool>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct EnsureStyleRequest {
    #[schemars(description = "CSL style id (e.g. 'apa') or an http(s) URL")]
    pub style: String,
}

// ============================================================================
// Build
// ============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildExportsRequest {
    #[schemars(description = "Markdown text (string or list of fragments)")]
    pub document_content: Option<Value>,
    #[schemars(description = "Markdown file on the server, used when documentContent is absent")]
    pub document_path: Option<String>,
    #[schemars(description = "Output formats: docx, pdf, odt, rtf, epub")]
    pub formats: Vec<String>,
    #[schemars(description = "File name without extension (default: derived from the document)")]
    pub output_basename: Option<String>,
    #[schemars(description = "CSL-JSON as text, or an already parsed array/object")]
    pub bibliography_content: Option<Value>,
    #[schemars(description = "CSL style XML as text")]
    pub csl_content: Option<Value>,
    #[schemars(description = "Run citation processing (default: true)")]
    pub use_citeproc: Option<bool>,
    #[schemars(description = "wkhtmltopdf, weasyprint or xelatex")]
    pub pdf_engine: Option<String>,
    #[schemars(description = "Additional pandoc arguments (output redirection is rejected)")]
    pub extra_args: Option<Vec<String>>,
    #[schemars(description = "Always return download tokens instead of inline content")]
    pub externalize: Option<bool>,
}

// ============================================================================
// Library
// ============================================================================

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchItemsRequest {
    pub query: String,
    #[schemars(description = "titleCreatorYear (default) or everything")]
    pub qmode: Option<QueryMode>,
    #[schemars(description = "Tag filter; supports Zotero boolean syntax (a || b, -c)")]
    pub tag: Option<String>,
    #[schemars(description = "Maximum results, 1-100 (default: 10)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetCollectionsRequest {
    #[schemars(description = "List only the children of this collection")]
    pub parent_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemKeyRequest {
    #[schemars(description = "Zotero item key (e.g. from zotero_search_items)")]
    pub item_key: String,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SuggestCitationsRequest {
    #[schemars(description = "Passage to find citations for (at least 3 characters)")]
    pub text: String,
    #[schemars(description = "Maximum suggestions, 1-100 (default: 5)")]
    pub limit: Option<u32>,
    #[schemars(description = "titleCreatorYear (default) or everything")]
    pub qmode: Option<QueryMode>,
}
