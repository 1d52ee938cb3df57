// src/mcp/mod.rs
// MCP Server implementation

mod handler;
pub mod requests;
pub mod responses;

use crate::config::EnvConfig;
use crate::error::ZoteroMcpError;
use crate::http::create_shared_client;
use crate::registry::FileRegistry;
use crate::tools::core::{self as tools, ToolContext};
use crate::zotero::{LibrarySource, StyleFetcher, SuggestionCache, ZoteroClient};
use requests::*;
use responses::*;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    tool, tool_router,
};
use std::sync::Arc;
use tracing::{info, warn};

/// MCP Server state
#[derive(Clone)]
pub struct ZoteroServer {
    pub config: Arc<EnvConfig>,
    pub registry: Arc<FileRegistry>,
    pub library: Option<Arc<dyn LibrarySource>>,
    pub styles: Arc<StyleFetcher>,
    pub suggestions: Arc<SuggestionCache>,
    tool_router: ToolRouter<Self>,
}

impl ZoteroServer {
    /// Build the server from configuration, creating the Zotero client when credentials exist.
    pub fn new(config: Arc<EnvConfig>, registry: Arc<FileRegistry>) -> Self {
        let http = create_shared_client(config.zotero.request_timeout);
        let library: Option<Arc<dyn LibrarySource>> = if config.zotero.is_configured() {
            match ZoteroClient::from_config(&config.zotero, &config.cache, http.clone()) {
                Ok(client) => {
                    info!(library = %client.describe(), "Zotero client ready");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!(error = %e, "Zotero client unavailable");
                    None
                }
            }
        } else {
            None
        };
        let styles = Arc::new(StyleFetcher::new(
            http,
            config.cache.ttl,
            config.cache.max_entries,
        ));
        Self::with_parts(config, registry, library, styles)
    }

    /// Assemble from prebuilt parts (tests and alternate library sources)
    pub fn with_parts(
        config: Arc<EnvConfig>,
        registry: Arc<FileRegistry>,
        library: Option<Arc<dyn LibrarySource>>,
        styles: Arc<StyleFetcher>,
    ) -> Self {
        let suggestions = Arc::new(SuggestionCache::new(&config.cache));
        Self {
            config,
            registry,
            library,
            styles,
            suggestions,
            tool_router: Self::tool_router(),
        }
    }

    /// Names of every registered tool
    pub fn list_tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect()
    }
}

impl ToolContext for ZoteroServer {
    fn config(&self) -> &EnvConfig {
        &self.config
    }

    fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    fn styles(&self) -> &StyleFetcher {
        &self.styles
    }

    fn library(&self) -> Option<&Arc<dyn LibrarySource>> {
        self.library.as_ref()
    }

    fn suggestions(&self) -> &SuggestionCache {
        &self.suggestions
    }
}

fn user_error(e: ZoteroMcpError) -> String {
    e.to_user_string()
}

#[tool_router]
impl ZoteroServer {
    #[tool(description = "Report server health: pandoc and PDF engine discovery with versions, Zotero client status, and effective config.")]
    async fn zotero_health(&self) -> Result<Json<HealthOutput>, String> {
        tools::health(self).await.map_err(user_error)
    }

    #[tool(description = "Normalize a bibliography payload (CSL-JSON text, parsed array/object, or malformed export) into validated CSL-JSON entries, mapping native Zotero records as a fallback. Returns entries, content, warnings, and diagnostic codes.")]
    async fn zotero_normalize_bibliography(
        &self,
        Parameters(req): Parameters<NormalizeBibliographyRequest>,
    ) -> Result<Json<NormalizeOutput>, String> {
        tools::normalize_bibliography(self, req).await.map_err(user_error)
    }

    #[tool(description = "Validate citations in Markdown content (or a documentPath on the server) against a CSL-JSON bibliography; report unresolved keys, duplicate ids, missing fields, and suggestions.")]
    async fn zotero_validate_references_content(
        &self,
        Parameters(req): Parameters<ValidateReferencesRequest>,
    ) -> Result<Json<ValidateOutput>, String> {
        tools::validate_references_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Build DOCX/PDF/ODT/RTF/EPUB from Markdown content using Pandoc with citation processing. Small results are inlined as base64; large ones return download tokens and URLs for direct file retrieval.")]
    async fn zotero_build_exports_content(
        &self,
        Parameters(req): Parameters<BuildExportsRequest>,
    ) -> Result<Json<BuildExportsOutput>, String> {
        tools::build_exports_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Export the library or a collection as content (csljson|bibtex|biblatex). CSL-JSON is validated and rebuilt from native records when the export is unusable. Returns content, count, sha256, and warnings.")]
    async fn zotero_export_bibliography_content(
        &self,
        Parameters(req): Parameters<ExportBibliographyRequest>,
    ) -> Result<Json<ExportBibliographyOutput>, String> {
        tools::export_bibliography_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Resolve citekeys to item metadata (id, title, author, issued, type) using a CSL-JSON bibliography; reports unresolved and duplicate keys.")]
    async fn zotero_resolve_citekeys(
        &self,
        Parameters(req): Parameters<ResolveCitekeysRequest>,
    ) -> Result<Json<ResolveCitekeysOutput>, String> {
        tools::resolve_citekeys(self, req).await.map_err(user_error)
    }

    #[tool(description = "Format citations for pandoc ([@a; @b, p. 42]) or LaTeX (\\parencite[42]{a,b}) given citekeys and optional prefix/suffix/pages.")]
    async fn zotero_insert_citation_content(
        &self,
        Parameters(req): Parameters<InsertCitationRequest>,
    ) -> Result<Json<InsertCitationOutput>, String> {
        tools::insert_citation_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Ensure a Markdown string's YAML front matter contains bibliography, csl, and link-citations keys, preserving other keys. Returns updatedContent and the keys changed.")]
    async fn zotero_ensure_yaml_citations_content(
        &self,
        Parameters(req): Parameters<EnsureYamlCitationsRequest>,
    ) -> Result<Json<YamlCitationsOutput>, String> {
        tools::ensure_yaml_citations_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Fetch CSL style content by style id (official styles repository) or URL. Returns content, sha256, and etag without touching the filesystem.")]
    async fn zotero_ensure_style_content(
        &self,
        Parameters(req): Parameters<EnsureStyleRequest>,
    ) -> Result<Json<StyleOutput>, String> {
        tools::ensure_style_content(self, req).await.map_err(user_error)
    }

    #[tool(description = "Search items in the Zotero library by query string, query mode (titleCreatorYear or everything), and optional tag filter. Use the returned keys with zotero_item_metadata or zotero_item_fulltext.")]
    async fn zotero_search_items(
        &self,
        Parameters(req): Parameters<SearchItemsRequest>,
    ) -> Result<Json<SearchOutput>, String> {
        tools::search_items(self, req).await.map_err(user_error)
    }

    #[tool(description = "Get full metadata for one Zotero item by key: type, title, creators, date, publication, abstract, tags, DOI/URL/ISBN/ISSN, and child count.")]
    async fn zotero_item_metadata(
        &self,
        Parameters(req): Parameters<ItemKeyRequest>,
    ) -> Result<Json<ItemMetadataOutput>, String> {
        tools::item_metadata(self, req).await.map_err(user_error)
    }

    #[tool(description = "Get the indexed full text of a Zotero item from its PDF (or other) attachment, with attachment key, content type, and word count.")]
    async fn zotero_item_fulltext(
        &self,
        Parameters(req): Parameters<ItemKeyRequest>,
    ) -> Result<Json<ItemFulltextOutput>, String> {
        tools::item_fulltext(self, req).await.map_err(user_error)
    }

    #[tool(description = "Suggest citations for a passage of text: ranks library items by overlap with titles (weighted double), creators, and DOI, preferring recent search results before querying Zotero. Returns scores and match rationale.")]
    async fn zotero_suggest_citations(
        &self,
        Parameters(req): Parameters<SuggestCitationsRequest>,
    ) -> Result<Json<SuggestionsOutput>, String> {
        tools::suggest_citations(self, req).await.map_err(user_error)
    }

    #[tool(description = "List Zotero collections as a flat tree with key, name, parentKey, path, and itemCount. Optionally list only children of parentKey.")]
    async fn zotero_get_collections(
        &self,
        Parameters(req): Parameters<GetCollectionsRequest>,
    ) -> Result<Json<CollectionsOutput>, String> {
        tools::get_collections(self, req).await.map_err(user_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilesConfig;
    use std::time::Duration;

    fn server() -> ZoteroServer {
        let config = Arc::new(EnvConfig::default());
        let registry = Arc::new(FileRegistry::from_config(&FilesConfig::default()));
        let styles = Arc::new(StyleFetcher::new(
            reqwest::Client::new(),
            Duration::from_secs(60),
            10,
        ));
        ZoteroServer::with_parts(config, registry, None, styles)
    }

    #[test]
    fn test_router_lists_every_tool() {
        let mut names = server().list_tool_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "zotero_build_exports_content",
                "zotero_ensure_style_content",
                "zotero_ensure_yaml_citations_content",
                "zotero_export_bibliography_content",
                "zotero_get_collections",
                "zotero_health",
                "zotero_insert_citation_content",
                "zotero_item_fulltext",
                "zotero_item_metadata",
                "zotero_normalize_bibliography",
                "zotero_resolve_citekeys",
                "zotero_search_items",
                "zotero_suggest_citations",
                "zotero_validate_references_content",
            ]
        );
    }

    #[tokio::test]
    async fn test_library_tools_fail_with_config_payload_when_unconfigured() {
        let err = server()
            .zotero_get_collections(Parameters(GetCollectionsRequest::default()))
            .await
            .err()
            .expect("tool call should fail");
        let payload: serde_json::Value = serde_json::from_str(&err).unwrap();
        assert_eq!(payload["errorCode"], "CONFIG_ERROR");
        assert!(payload["message"].as_str().unwrap().contains("ZOTERO_LIBRARY_ID"));

        let err = server()
            .zotero_item_metadata(Parameters(ItemKeyRequest {
                item_key: "ITEM1".into(),
            }))
            .await
            .err()
            .expect("tool call should fail");
        assert!(err.contains("CONFIG_ERROR"));
    }
}
