// src/tools/core/build.rs
// Document build tool

use super::{ToolContext, bibliography_payload, build_environment, document_text};
use crate::bibliography::text_from_value;
use crate::error::Result;
use crate::export::{BuildRequest, BuildStatus, build_documents};
use crate::mcp::requests::BuildExportsRequest;
use crate::mcp::responses::{BuildExportsOutput, Json, ToolOutput};

pub async fn build_exports_content<C: ToolContext + ?Sized>(
    ctx: &C,
    req: BuildExportsRequest,
) -> Result<Json<BuildExportsOutput>> {
    let document = document_text(ctx, req.document_content.as_ref(), req.document_path.as_deref()).await?;
    let style = req
        .csl_content
        .as_ref()
        .filter(|v| !v.is_null())
        .map(text_from_value)
        .transpose()?;

    let request = BuildRequest {
        document,
        formats: req.formats,
        bibliography: bibliography_payload(req.bibliography_content)?,
        style,
        use_citeproc: req.use_citeproc.unwrap_or(true),
        output_basename: req.output_basename,
        pdf_engine: req.pdf_engine,
        extra_args: req.extra_args.unwrap_or_default(),
        externalize: req.externalize.unwrap_or(false),
    };
    let output = build_documents(&request, &build_environment(ctx)).await?;

    let message = match output.status {
        BuildStatus::Completed if output.failed_formats.is_empty() => {
            format!("Built {} artifact(s) for '{}'.", output.artifacts.len(), output.basename)
        }
        BuildStatus::Completed => format!(
            "Built {} artifact(s) for '{}'; failed: {}.",
            output.artifacts.len(),
            output.basename,
            output.failed_formats.join(", ")
        ),
        BuildStatus::Failed => format!(
            "No artifacts built for '{}'; failed: {}.",
            output.basename,
            output.failed_formats.join(", ")
        ),
    };
    Ok(Json(ToolOutput::new("build", message, output)))
}
