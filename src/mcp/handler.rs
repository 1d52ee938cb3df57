// src/mcp/handler.rs
// MCP ServerHandler implementation

use super::ZoteroServer;

use rmcp::{
    ErrorData, ServerHandler,
    handler::server::tool::ToolCallContext,
    model::{
        CallToolRequestParams, CallToolResult, Implementation, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
};
use std::time::Instant;
use tracing::{info, warn};

impl ServerHandler for ZoteroServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "zotero-mcp".into(),
                title: Some("Zotero MCP - bibliography export and document builds".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Content-first Zotero tools: pass Markdown and CSL-JSON as strings, validate citations, \
                 and build DOCX/PDF. Large files come back as download tokens under /files/{token}."
                    .into(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        }))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, ErrorData>> + Send + '_ {
        async move {
            let tool_name = request.name.to_string();
            let start = Instant::now();

            let ctx = ToolCallContext::new(self, request, context);
            let result = self.tool_router.call(ctx).await;

            let duration_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(r) if r.is_error == Some(true) => {
                    warn!(tool = %tool_name, duration_ms, "Tool returned an error")
                }
                Ok(_) => info!(tool = %tool_name, duration_ms, "Tool call completed"),
                Err(e) => warn!(tool = %tool_name, duration_ms, error = %e.message, "Tool call rejected"),
            }
            result
        }
    }
}
