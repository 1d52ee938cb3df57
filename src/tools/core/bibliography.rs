// src/tools/core/bibliography.rs
// Bibliography tools: normalize, validate, resolve and export

use super::{ToolContext, bibliography_payload, document_text, require_library};
use crate::bibliography::citation;
use crate::bibliography::normalize::normalize_newlines;
use crate::bibliography::{BibliographyPayload, DiagnosticCode, classify, csl, validate_references};
use crate::error::{Result, ZoteroMcpError};
use crate::mcp::requests::{
    ExportBibliographyRequest, ExportScopeKind, NormalizeBibliographyRequest,
    ResolveCitekeysRequest, ValidateReferencesRequest,
};
use crate::mcp::responses::{
    ExportBibliographyData, ExportBibliographyOutput, Json, NormalizeData, NormalizeOutput,
    ResolveCitekeysOutput, ToolOutput, ValidateData, ValidateOutput,
};
use crate::utils::sha256_hex;
use crate::zotero::{ExportFormat, ExportScope, FetchOptions, UpstreamPayload};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

/// BibTeX entry headers, excluding @comment/@string/@preamble blocks
static BIBTEX_ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*@(\w+)\s*[\{\(]").expect("valid regex")
});

const BIBTEX_NON_ENTRIES: &[&str] = &["comment", "string", "preamble"];

pub async fn normalize_bibliography<C: ToolContext + ?Sized>(
    _ctx: &C,
    req: NormalizeBibliographyRequest,
) -> Result<Json<NormalizeOutput>> {
    let payload = bibliography_payload(req.bibliography_content)?;
    let normalized = csl::normalize_bibliography(payload.as_ref(), req.fallback_records.as_deref());
    let content = normalized.to_json()?;
    let count = normalized.entries.len();

    Ok(Json(ToolOutput::new(
        "normalize",
        format!(
            "{} CSL entr{} ({} warning(s)).",
            count,
            if count == 1 { "y" } else { "ies" },
            normalized.warnings.len()
        ),
        NormalizeData {
            count,
            content,
            entries: normalized.entries,
            warnings: normalized.warnings,
            codes: normalized.codes,
        },
    )))
}

pub async fn validate_references_content<C: ToolContext + ?Sized>(
    ctx: &C,
    req: ValidateReferencesRequest,
) -> Result<Json<ValidateOutput>> {
    let document = document_text(ctx, req.document_content.as_ref(), req.document_path.as_deref()).await?;
    let payload = bibliography_payload(req.bibliography_content)?;
    let normalized = csl::normalize_bibliography(payload.as_ref(), None);
    let report = validate_references(&document, &normalized.entries, req.require_doi_url.unwrap_or(true));

    let message = if report.citation_count == 0 {
        "No citations found.".to_string()
    } else if report.is_clean() {
        format!(
            "{} citation(s) against {} entries: all resolved.",
            report.citation_count, report.entry_count
        )
    } else {
        format!(
            "{} citation(s) against {} entries: {} unresolved, {} duplicate id(s), {} entr(ies) missing fields.",
            report.citation_count,
            report.entry_count,
            report.unresolved_keys.len(),
            report.duplicate_keys.len(),
            report.missing_fields.len()
        )
    };

    Ok(Json(ToolOutput::new(
        "validate",
        message,
        ValidateData {
            report,
            bibliography_warnings: normalized.warnings,
            codes: normalized.codes,
        },
    )))
}

pub async fn resolve_citekeys<C: ToolContext + ?Sized>(
    _ctx: &C,
    req: ResolveCitekeysRequest,
) -> Result<Json<ResolveCitekeysOutput>> {
    if req.citekeys.iter().all(|k| k.trim().is_empty()) {
        return Err(ZoteroMcpError::InputShape(
            "citekeys must contain at least one key.".to_string(),
        ));
    }
    let payload = bibliography_payload(req.bibliography_content)?;
    let normalized = csl::normalize_bibliography(payload.as_ref(), None);
    let resolved = citation::resolve_citekeys(&req.citekeys, &normalized.entries);

    Ok(Json(ToolOutput::new(
        "resolve",
        format!(
            "{} resolved, {} unresolved.",
            resolved.resolved.len(),
            resolved.unresolved.len()
        ),
        resolved,
    )))
}

/// Export the library or a collection as content.
///
/// CSL-JSON is always returned citeproc-ready: when the upstream export is
/// not valid CSL-JSON the native records are fetched and mapped locally.
pub async fn export_bibliography_content<C: ToolContext + ?Sized>(
    ctx: &C,
    req: ExportBibliographyRequest,
) -> Result<Json<ExportBibliographyOutput>> {
    let scope = match (req.scope.unwrap_or_default(), req.collection_key) {
        (ExportScopeKind::Library, _) => ExportScope::Library,
        (ExportScopeKind::Collection, Some(key)) if !key.trim().is_empty() => {
            ExportScope::Collection(key.trim().to_string())
        }
        (ExportScopeKind::Collection, _) => {
            return Err(ZoteroMcpError::InputShape(
                "collectionKey is required when scope is 'collection'.".to_string(),
            ));
        }
    };
    let format = req.format.unwrap_or_default();
    let options = FetchOptions {
        limit: req.limit.unwrap_or(FetchOptions::default().limit),
        fetch_all: req.fetch_all.unwrap_or(true),
    };
    let library = require_library(ctx)?;
    let upstream = library.export(&scope, format, options).await?;

    let (content, count, warnings, codes) = match format {
        ExportFormat::Csljson => {
            let payload = match upstream {
                UpstreamPayload::Json(value) => BibliographyPayload::Structured(value),
                UpstreamPayload::Text(text) => BibliographyPayload::Text(text),
            };
            let shape = classify(&payload);
            let normalized = if shape.needs_synthesis() {
                warn!(scope = %scope.describe(), "CSL export unusable, mapping native records");
                let records = library.items(&scope, options).await?;
                csl::normalize_shape(shape, Some(&records))
            } else {
                csl::normalize_shape(shape, None)
            };
            let content = normalized.to_json()?;
            (content, normalized.entries.len(), normalized.warnings, normalized.codes)
        }
        ExportFormat::Bibtex | ExportFormat::Biblatex => {
            let text = match upstream {
                UpstreamPayload::Text(text) => text,
                UpstreamPayload::Json(value) => {
                    return Err(ZoteroMcpError::Upstream {
                        status: None,
                        message: format!(
                            "expected {} text, received JSON {}",
                            format.as_str(),
                            crate::bibliography::normalize::shape_name(&value)
                        ),
                        hint: None,
                    });
                }
            };
            let content = normalize_newlines(&text);
            let count = count_bibtex_entries(&content);
            let mut warnings = Vec::new();
            let mut codes = Vec::new();
            if count == 0 {
                warnings.push(format!("Export returned no {} entries.", format.as_str()));
                codes.push(DiagnosticCode::EmptyBibliography);
            }
            (content, count, warnings, codes)
        }
    };

    info!(
        format = format.as_str(),
        scope = %scope.describe(),
        count,
        warnings = warnings.len(),
        "Exported bibliography"
    );

    Ok(Json(ToolOutput::new(
        "export",
        format!(
            "Exported {} {} entr{} from {}.",
            count,
            format.as_str(),
            if count == 1 { "y" } else { "ies" },
            scope.describe()
        ),
        ExportBibliographyData {
            format: format.as_str().to_string(),
            scope: scope.describe(),
            sha256: sha256_hex(content.as_bytes()),
            content,
            count,
            warnings,
            codes,
        },
    )))
}

fn count_bibtex_entries(text: &str) -> usize {
    BIBTEX_ENTRY_RE
        .captures_iter(text)
        .filter(|c| {
            let kind = c[1].to_ascii_lowercase();
            !BIBTEX_NON_ENTRIES.contains(&kind.as_str())
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_bibtex_entries_skips_meta_blocks() {
        let text = "@comment{jabref}\n@string{acm = \"ACM\"}\n@article{doe2020,\n  title={A}\n}\n\n  @Book{roe2019,\n}\n";
        assert_eq!(count_bibtex_entries(text), 2);
        assert_eq!(count_bibtex_entries(""), 0);
    }
}
