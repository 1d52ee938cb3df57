// src/cli/tool.rs
// Direct tool execution from CLI

use super::serve::setup_server_context;
use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use zotero_mcp::error::ZoteroMcpError;
use zotero_mcp::mcp::ZoteroServer;
use zotero_mcp::mcp::requests::{
    BuildExportsRequest, EnsureStyleRequest, EnsureYamlCitationsRequest,
    ExportBibliographyRequest, GetCollectionsRequest, InsertCitationRequest, ItemKeyRequest,
    NormalizeBibliographyRequest, ResolveCitekeysRequest, SearchItemsRequest,
    SuggestCitationsRequest, ValidateReferencesRequest,
};
use zotero_mcp::mcp::responses::Json;
use zotero_mcp::tools::core as tools;

fn parse<T: DeserializeOwned>(args: &str) -> Result<T, ZoteroMcpError> {
    serde_json::from_str(args)
        .map_err(|e| ZoteroMcpError::InputShape(format!("Invalid tool arguments: {}", e)))
}

fn render<T: Serialize>(result: Result<Json<T>, ZoteroMcpError>) -> Result<String, ZoteroMcpError> {
    let Json(output) = result?;
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Run one tool against `server`, returning its JSON output.
pub async fn dispatch(server: &ZoteroServer, name: &str, args: &str) -> Result<String, ZoteroMcpError> {
    let name = name.strip_prefix("zotero_").unwrap_or(name);
    match name {
        "health" => render(tools::health(server).await),
        "normalize_bibliography" => {
            let req: NormalizeBibliographyRequest = parse(args)?;
            render(tools::normalize_bibliography(server, req).await)
        }
        "validate_references_content" => {
            let req: ValidateReferencesRequest = parse(args)?;
            render(tools::validate_references_content(server, req).await)
        }
        "build_exports_content" => {
            let req: BuildExportsRequest = parse(args)?;
            render(tools::build_exports_content(server, req).await)
        }
        "export_bibliography_content" => {
            let req: ExportBibliographyRequest = parse(args)?;
            render(tools::export_bibliography_content(server, req).await)
        }
        "resolve_citekeys" => {
            let req: ResolveCitekeysRequest = parse(args)?;
            render(tools::resolve_citekeys(server, req).await)
        }
        "insert_citation_content" => {
            let req: InsertCitationRequest = parse(args)?;
            render(tools::insert_citation_content(server, req).await)
        }
        "ensure_yaml_citations_content" => {
            let req: EnsureYamlCitationsRequest = parse(args)?;
            render(tools::ensure_yaml_citations_content(server, req).await)
        }
        "ensure_style_content" => {
            let req: EnsureStyleRequest = parse(args)?;
            render(tools::ensure_style_content(server, req).await)
        }
        "search_items" => {
            let req: SearchItemsRequest = parse(args)?;
            render(tools::search_items(server, req).await)
        }
        "item_metadata" => {
            let req: ItemKeyRequest = parse(args)?;
            render(tools::item_metadata(server, req).await)
        }
        "item_fulltext" => {
            let req: ItemKeyRequest = parse(args)?;
            render(tools::item_fulltext(server, req).await)
        }
        "suggest_citations" => {
            let req: SuggestCitationsRequest = parse(args)?;
            render(tools::suggest_citations(server, req).await)
        }
        "get_collections" => {
            let req: GetCollectionsRequest = parse(args)?;
            render(tools::get_collections(server, req).await)
        }
        _ => Err(ZoteroMcpError::InputShape(format!("Unknown tool: {}", name))),
    }
}

/// Execute a tool directly from the command line
pub async fn run_tool(name: String, args: String) -> Result<()> {
    let server = setup_server_context()?;
    match dispatch(&server, &name, &args).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            println!("{}", e.to_user_string());
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Returns the list of tool names supported by the CLI dispatcher.
/// Used for verification against MCP router.
#[cfg(test)]
fn list_cli_tool_names() -> Vec<&'static str> {
    vec![
        "zotero_health",
        "zotero_normalize_bibliography",
        "zotero_validate_references_content",
        "zotero_build_exports_content",
        "zotero_export_bibliography_content",
        "zotero_resolve_citekeys",
        "zotero_insert_citation_content",
        "zotero_ensure_yaml_citations_content",
        "zotero_ensure_style_content",
        "zotero_search_items",
        "zotero_item_metadata",
        "zotero_item_fulltext",
        "zotero_suggest_citations",
        "zotero_get_collections",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;
    use zotero_mcp::config::{EnvConfig, FilesConfig};
    use zotero_mcp::registry::FileRegistry;
    use zotero_mcp::zotero::StyleFetcher;

    fn server() -> ZoteroServer {
        let styles = Arc::new(StyleFetcher::new(reqwest::Client::new(), Duration::from_secs(60), 10));
        ZoteroServer::with_parts(
            Arc::new(EnvConfig::default()),
            Arc::new(FileRegistry::from_config(&FilesConfig::default())),
            None,
            styles,
        )
    }

    /// Verifies CLI dispatcher supports all MCP tools.
    #[test]
    fn cli_tools_match_mcp_tools() {
        let mcp_tools: HashSet<String> = server().list_tool_names().into_iter().collect();
        let cli_tools: HashSet<String> = list_cli_tool_names().into_iter().map(String::from).collect();
        assert_eq!(mcp_tools, cli_tools);
    }

    #[tokio::test]
    async fn dispatch_accepts_short_and_full_names() {
        let args = r#"{"citekeys": ["doe2020"], "pages": "42"}"#;
        let full = dispatch(&server(), "zotero_insert_citation_content", args).await.unwrap();
        let short = dispatch(&server(), "insert_citation_content", args).await.unwrap();
        assert_eq!(full, short);
        assert!(full.contains("[@doe2020, p. 42]"));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_tools_and_bad_args() {
        assert!(matches!(
            dispatch(&server(), "nope", "{}").await,
            Err(ZoteroMcpError::InputShape(_))
        ));
        assert!(matches!(
            dispatch(&server(), "insert_citation_content", "not json").await,
            Err(ZoteroMcpError::InputShape(_))
        ));
    }
}
