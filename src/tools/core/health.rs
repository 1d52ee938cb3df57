// src/tools/core/health.rs
// Server health: binary discovery, library status and effective config

use super::ToolContext;
use crate::error::Result;
use crate::export::{find_pandoc, probe_version, resolve_pdf_engine};
use crate::mcp::responses::{
    BinaryStatus, ConfigSummary, HealthData, HealthOutput, Json, ToolOutput, ZoteroStatus,
};
use std::time::Instant;

pub async fn health<C: ToolContext + ?Sized>(ctx: &C) -> Result<Json<HealthOutput>> {
    let start = Instant::now();
    let config = ctx.config();
    let search_path = ctx.search_path();
    let mut warnings = Vec::new();

    let pandoc = match find_pandoc(&config.export, search_path.as_deref()) {
        Ok(path) => Some(BinaryStatus {
            name: "pandoc".to_string(),
            version: probe_version(&path).await,
            path: path.display().to_string(),
        }),
        Err(e) => {
            warnings.push(e.payload().message);
            None
        }
    };

    let (engine, engine_warnings) = resolve_pdf_engine(&config.export, None, search_path.as_deref());
    warnings.extend(engine_warnings);
    let pdf_engine = match engine {
        Some(resolved) => Some(BinaryStatus {
            name: resolved.engine.as_str().to_string(),
            version: probe_version(&resolved.path).await,
            path: resolved.path.display().to_string(),
        }),
        None => None,
    };

    let zotero = ZoteroStatus {
        configured: ctx.library().is_some(),
        library: ctx.library().map(|l| l.describe()),
    };
    if !zotero.configured {
        warnings.push(super::NO_LIBRARY_ERROR.to_string());
    }

    let summary = ConfigSummary {
        request_timeout_secs: config.zotero.request_timeout.as_secs(),
        cache_ttl_secs: config.cache.ttl.as_secs(),
        cache_max: config.cache.max_entries,
        rate_min_interval_ms: config.cache.rate_min_interval.as_millis() as u64,
        inline_max_bytes: config.export.inline_max_bytes,
        build_timeout_secs: config.export.build_timeout.as_secs(),
        files_dir: ctx.registry().root().display().to_string(),
        file_ttl_secs: ctx.registry().ttl().as_secs(),
        delete_after_download: config.files.delete_after_download,
        public_url: ctx.public_base_url(),
        log_level: config.log_level.clone(),
    };

    let healthy = pandoc.is_some() && zotero.configured;
    let message = match (&pandoc, &pdf_engine) {
        (Some(_), Some(engine)) => format!("pandoc ok, pdf engine {}.", engine.name),
        (Some(_), None) => "pandoc ok, no pdf engine.".to_string(),
        (None, _) => "pandoc missing; builds return manual instructions.".to_string(),
    };

    Ok(Json(ToolOutput::new(
        if healthy { "ok" } else { "degraded" },
        message,
        HealthData {
            version: env!("CARGO_PKG_VERSION").to_string(),
            yaml_parser: "serde_yaml".to_string(),
            zotero,
            pandoc,
            pdf_engine,
            config: summary,
            registered_files: ctx.registry().len(),
            warnings,
            elapsed_ms: start.elapsed().as_millis() as u64,
        },
    )))
}
