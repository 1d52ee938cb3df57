// src/tools/core/citations.rs
// Citation markup, front matter keys and CSL styles

use super::ToolContext;
use crate::bibliography::citation::{CitationOptions, CitationStyle, format_citation};
use crate::bibliography::front_matter::{YamlCitationOptions, ensure_yaml_citations};
use crate::bibliography::text_from_value;
use crate::error::Result;
use crate::mcp::requests::{EnsureStyleRequest, EnsureYamlCitationsRequest, InsertCitationRequest};
use crate::mcp::responses::{
    CitationData, InsertCitationOutput, Json, StyleOutput, ToolOutput, YamlCitationsOutput,
};

pub async fn insert_citation_content<C: ToolContext + ?Sized>(
    _ctx: &C,
    req: InsertCitationRequest,
) -> Result<Json<InsertCitationOutput>> {
    let style = req.style.unwrap_or_default();
    let citation = format_citation(
        &req.citekeys,
        &CitationOptions {
            style,
            prefix: req.prefix,
            locator: req.pages,
            suffix: req.suffix,
        },
    )?;
    let style = match style {
        CitationStyle::Pandoc => "pandoc",
        CitationStyle::Latex => "latex",
    };
    Ok(Json(ToolOutput::new(
        "insert",
        citation.clone(),
        CitationData {
            citation,
            style: style.to_string(),
        },
    )))
}

pub async fn ensure_yaml_citations_content<C: ToolContext + ?Sized>(
    _ctx: &C,
    req: EnsureYamlCitationsRequest,
) -> Result<Json<YamlCitationsOutput>> {
    let document = text_from_value(&req.document_content)?;
    let update = ensure_yaml_citations(
        &document,
        &YamlCitationOptions {
            bibliography: req.bibliography_content,
            csl: req.csl_content,
            link_citations: Some(req.link_citations.unwrap_or(true)),
        },
    )?;
    let message = if update.changed {
        format!("Updated front matter keys: {}.", update.keys_updated.join(", "))
    } else {
        "Front matter already up to date.".to_string()
    };
    Ok(Json(ToolOutput::new("ensure_yaml", message, update)))
}

pub async fn ensure_style_content<C: ToolContext + ?Sized>(
    ctx: &C,
    req: EnsureStyleRequest,
) -> Result<Json<StyleOutput>> {
    let style = ctx.styles().fetch(&req.style).await?;
    Ok(Json(ToolOutput::new(
        "ensure_style",
        format!("Fetched {} ({} bytes).", style.source_url, style.bytes),
        style,
    )))
}
