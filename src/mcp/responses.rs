//! Structured output types for MCP tools.
//!
//! Each tool returns a `ToolOutput` with `action`, `message`, and optional typed `data`.
//! Using `Json<T>` return types, rmcp infers an `outputSchema` for each tool.
//! The root type is always an object (MCP requirement).

pub use rmcp::handler::server::wrapper::Json;

use crate::bibliography::citation::ResolvedCitekeys;
use crate::bibliography::front_matter::YamlCitationsUpdate;
use crate::bibliography::{CslEntry, DiagnosticCode, ValidationReport};
use crate::export::BuildOutput;
use crate::zotero::{
    AttachmentInfo, CollectionNode, FetchedStyle, ItemDetails, ItemSummary, Suggestion,
};
use schemars::JsonSchema;
use serde::Serialize;

#[derive(Debug, Serialize, JsonSchema)]
pub struct ToolOutput<D> {
    pub action: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<D>,
}

impl<D> ToolOutput<D> {
    pub fn new(action: &str, message: impl Into<String>, data: D) -> Self {
        Self {
            action: action.to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

pub type HealthOutput = ToolOutput<HealthData>;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub version: String,
    pub yaml_parser: String,
    pub zotero: ZoteroStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pandoc: Option<BinaryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_engine: Option<BinaryStatus>,
    pub config: ConfigSummary,
    pub registered_files: usize,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZoteroStatus {
    pub configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BinaryStatus {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max: usize,
    pub rate_min_interval_ms: u64,
    pub inline_max_bytes: u64,
    pub build_timeout_secs: u64,
    pub files_dir: String,
    pub file_ttl_secs: u64,
    pub delete_after_download: bool,
    pub public_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

// ============================================================================
// Bibliography
// ============================================================================

pub type NormalizeOutput = ToolOutput<NormalizeData>;

#[derive(Debug, Serialize, JsonSchema)]
pub struct NormalizeData {
    pub entries: Vec<CslEntry>,
    pub count: usize,
    /// Entries serialized as CSL-JSON text
    pub content: String,
    pub warnings: Vec<String>,
    pub codes: Vec<DiagnosticCode>,
}

pub type ValidateOutput = ToolOutput<ValidateData>;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateData {
    #[serde(flatten)]
    pub report: ValidationReport,
    /// Diagnostics from normalizing the bibliography
    pub bibliography_warnings: Vec<String>,
    pub codes: Vec<DiagnosticCode>,
}

pub type ExportBibliographyOutput = ToolOutput<ExportBibliographyData>;

#[derive(Debug, Serialize, JsonSchema)]
pub struct ExportBibliographyData {
    pub format: String,
    pub scope: String,
    pub content: String,
    pub count: usize,
    pub sha256: String,
    pub warnings: Vec<String>,
    pub codes: Vec<DiagnosticCode>,
}

pub type ResolveCitekeysOutput = ToolOutput<ResolvedCitekeys>;

// ============================================================================
// Citations / front matter / styles
// ============================================================================

pub type InsertCitationOutput = ToolOutput<CitationData>;

#[derive(Debug, Serialize, JsonSchema)]
pub struct CitationData {
    pub citation: String,
    pub style: String,
}

pub type YamlCitationsOutput = ToolOutput<YamlCitationsUpdate>;

pub type StyleOutput = ToolOutput<FetchedStyle>;

// ============================================================================
// Build
// ============================================================================

pub type BuildExportsOutput = ToolOutput<BuildOutput>;

// ============================================================================
// Library
// ============================================================================

pub type SearchOutput = ToolOutput<SearchData>;

#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchData {
    pub query: String,
    pub qmode: String,
    pub items: Vec<ItemSummary>,
    pub count: usize,
}

pub type CollectionsOutput = ToolOutput<CollectionsData>;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionsData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    pub collections: Vec<CollectionNode>,
    pub count: usize,
}

pub type ItemMetadataOutput = ToolOutput<ItemDetails>;

pub type ItemFulltextOutput = ToolOutput<FulltextData>;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FulltextData {
    pub item: ItemSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub word_count: usize,
}

pub type SuggestionsOutput = ToolOutput<SuggestionsData>;

#[derive(Debug, Serialize, JsonSchema)]
pub struct SuggestionsData {
    /// Query mode of the search the candidates came from
    pub qmode: String,
    /// local (recent searches), cache, or server
    pub source: String,
    pub suggestions: Vec<Suggestion>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::handler::server::tool::schema_for_output;

    #[test]
    fn all_schemas_are_valid_mcp_output() {
        // Each output type must produce a root type "object" schema
        assert!(schema_for_output::<HealthOutput>().is_ok(), "HealthOutput");
        assert!(schema_for_output::<NormalizeOutput>().is_ok(), "NormalizeOutput");
        assert!(schema_for_output::<ValidateOutput>().is_ok(), "ValidateOutput");
        assert!(
            schema_for_output::<ExportBibliographyOutput>().is_ok(),
            "ExportBibliographyOutput"
        );
        assert!(
            schema_for_output::<ResolveCitekeysOutput>().is_ok(),
            "ResolveCitekeysOutput"
        );
        assert!(
            schema_for_output::<InsertCitationOutput>().is_ok(),
            "InsertCitationOutput"
        );
        assert!(
            schema_for_output::<YamlCitationsOutput>().is_ok(),
            "YamlCitationsOutput"
        );
        assert!(schema_for_output::<StyleOutput>().is_ok(), "StyleOutput");
        assert!(
            schema_for_output::<BuildExportsOutput>().is_ok(),
            "BuildExportsOutput"
        );
        assert!(schema_for_output::<SearchOutput>().is_ok(), "SearchOutput");
        assert!(
            schema_for_output::<CollectionsOutput>().is_ok(),
            "CollectionsOutput"
        );
        assert!(
            schema_for_output::<ItemMetadataOutput>().is_ok(),
            "ItemMetadataOutput"
        );
        assert!(
            schema_for_output::<ItemFulltextOutput>().is_ok(),
            "ItemFulltextOutput"
        );
        assert!(
            schema_for_output::<SuggestionsOutput>().is_ok(),
            "SuggestionsOutput"
        );
    }

    #[test]
    fn data_is_omitted_when_absent() {
        let out: CitationData = CitationData {
            citation: "[@a]".into(),
            style: "pandoc".into(),
        };
        let with = serde_json::to_value(ToolOutput::new("insert", "ok", out)).unwrap();
        assert_eq!(with["data"]["citation"], "[@a]");

        let without = ToolOutput::<CitationData> {
            action: "insert".into(),
            message: "nothing".into(),
            data: None,
        };
        let value = serde_json::to_value(without).unwrap();
        assert!(value.get("data").is_none());
    }
}
