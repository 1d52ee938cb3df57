// src/export/build.rs
// Markdown to document builds through pandoc, with inline or tokenized delivery

use super::command::{BIBLIOGRAPHY_FILE, DOCUMENT_FILE, PandocPlan, STYLE_FILE, check_extra_args};
use super::discovery::{ResolvedEngine, find_pandoc, resolve_pdf_engine};
use super::format::{OutputFormat, PdfEngine, derive_basename, parse_formats};
use super::manual::manual_build_kit;
use crate::bibliography::normalize::normalize_newlines;
use crate::bibliography::{BibliographyPayload, normalize_bibliography};
use crate::config::ExportConfig;
use crate::error::{Result, ZoteroMcpError};
use crate::registry::FileRegistry;
use crate::utils::{token_prefix, truncate};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::json;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Captured stderr kept in a warning
const MAX_STDERR_CHARS: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub document: String,
    pub formats: Vec<String>,
    pub bibliography: Option<BibliographyPayload>,
    /// CSL style XML
    pub style: Option<String>,
    pub use_citeproc: bool,
    pub output_basename: Option<String>,
    pub pdf_engine: Option<String>,
    pub extra_args: Vec<String>,
    /// Always register results for download, whatever their size
    pub externalize: bool,
}

/// Everything a build needs from its surroundings.
pub struct BuildEnvironment<'a> {
    pub config: &'a ExportConfig,
    pub registry: &'a FileRegistry,
    pub public_base_url: String,
    /// Directories searched for binaries; `None` searches nothing
    pub search_path: Option<OsString>,
    /// Parent for per-build temp dirs (system temp dir when unset)
    pub temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildStage {
    ValidatingInput,
    ResolvingEngines,
    WritingTemp,
    InvokingBinary,
    Inlining,
    Registering,
    AssemblingResult,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStage::ValidatingInput => "validating-input",
            BuildStage::ResolvingEngines => "resolving-engines",
            BuildStage::WritingTemp => "writing-temp",
            BuildStage::InvokingBinary => "invoking-binary",
            BuildStage::Inlining => "inlining",
            BuildStage::Registering => "registering",
            BuildStage::AssemblingResult => "assembling-result",
        })
    }
}

/// How an artifact reaches the caller. Exactly one form per artifact.
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(tag = "delivery", rename_all = "lowercase")]
pub enum Delivery {
    Inline {
        #[serde(rename = "contentBase64")]
        content_base64: String,
    },
    Download {
        token: String,
        #[serde(rename = "downloadUrl")]
        download_url: String,
        /// RFC 3339 timestamp
        #[serde(rename = "expiresAt")]
        expires_at: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct BuildArtifact {
    pub format: String,
    pub filename: String,
    pub size: u64,
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl BuildArtifact {
    pub fn inline(format: OutputFormat, filename: String, bytes: &[u8]) -> Self {
        Self {
            format: format.to_string(),
            filename,
            size: bytes.len() as u64,
            delivery: Delivery::Inline {
                content_base64: STANDARD.encode(bytes),
            },
        }
    }

    pub fn download(
        format: OutputFormat,
        filename: String,
        size: u64,
        token: String,
        download_url: String,
        expires_at: String,
    ) -> Self {
        Self {
            format: format.to_string(),
            filename,
            size,
            delivery: Delivery::Download {
                token,
                download_url,
                expires_at,
            },
        }
    }

    pub fn token(&self) -> Option<&str> {
        match &self.delivery {
            Delivery::Download { token, .. } => Some(token),
            Delivery::Inline { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub status: BuildStatus,
    pub basename: String,
    pub artifacts: Vec<BuildArtifact>,
    pub warnings: Vec<String>,
    pub failed_formats: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_engine: Option<String>,
    pub elapsed_ms: u64,
}

struct Validated {
    formats: Vec<OutputFormat>,
    basename: String,
    document: String,
    bibliography_json: Option<String>,
    style: Option<String>,
    requested_engine: Option<PdfEngine>,
    plan: PandocPlan,
    warnings: Vec<String>,
}

fn validate_request(request: &BuildRequest) -> Result<Validated> {
    let formats = parse_formats(&request.formats)?;
    check_extra_args(&request.extra_args)?;

    let requested_engine = match request.pdf_engine.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(name) => Some(PdfEngine::parse(name).ok_or_else(|| {
            ZoteroMcpError::InputShape(format!(
                "Unknown pdfEngine '{}'. Valid options: {}.",
                name,
                PdfEngine::names().join(", ")
            ))
        })?),
    };

    let mut warnings = Vec::new();
    let bibliography_json = match &request.bibliography {
        Some(payload) => {
            let normalized = normalize_bibliography(Some(payload), None);
            warnings.extend(normalized.warnings.iter().cloned());
            Some(normalized.to_json()?)
        }
        None => None,
    };
    let style = request
        .style
        .as_deref()
        .map(normalize_newlines)
        .filter(|s| !s.trim().is_empty());

    let plan = PandocPlan {
        citeproc: request.use_citeproc,
        bibliography: bibliography_json.is_some(),
        style: style.is_some(),
        extra_args: request.extra_args.clone(),
    };

    Ok(Validated {
        basename: derive_basename(request.output_basename.as_deref(), &request.document),
        document: normalize_newlines(&request.document),
        formats,
        bibliography_json,
        style,
        requested_engine,
        plan,
        warnings,
    })
}

/// Build every requested format.
///
/// Input and discovery problems are errors raised before any file is written.
/// Per-format failures become warnings, and a call where every format failed
/// still returns a result with `status: failed`.
pub async fn build_documents(request: &BuildRequest, env: &BuildEnvironment<'_>) -> Result<BuildOutput> {
    let started = Instant::now();
    let build_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
    let stage = |s: BuildStage| debug!(build_id = %build_id, stage = %s, "Build stage");

    stage(BuildStage::ValidatingInput);
    let Validated {
        formats,
        basename,
        document,
        bibliography_json,
        style,
        requested_engine,
        plan,
        mut warnings,
    } = validate_request(request)?;

    stage(BuildStage::ResolvingEngines);
    let search_path = env.search_path.as_deref();
    let pandoc = find_pandoc(env.config, search_path).map_err(|e| {
        let kit = manual_build_kit(&formats, &basename, &plan, requested_engine);
        attach_manual_kit(e, json!({ "manualBuild": kit }))
    })?;

    let mut engine: Option<ResolvedEngine> = None;
    let mut to_build = formats.clone();
    let mut failed_formats = Vec::new();
    if formats.contains(&OutputFormat::Pdf) {
        let (resolved, engine_warnings) =
            resolve_pdf_engine(env.config, requested_engine, search_path);
        warnings.extend(engine_warnings);
        if resolved.is_none() {
            to_build.retain(|f| *f != OutputFormat::Pdf);
            failed_formats.push(OutputFormat::Pdf.to_string());
        }
        engine = resolved;
    }

    let format_names: Vec<&str> = formats.iter().map(|f| f.as_str()).collect();
    info!(
        build_id = %build_id,
        formats = ?format_names,
        basename = %basename,
        pandoc = %pandoc.display(),
        pdf_engine = engine.as_ref().map(|e| e.engine.as_str()),
        "Starting document build"
    );

    let mut artifacts = Vec::new();
    if !to_build.is_empty() {
        stage(BuildStage::WritingTemp);
        let mut builder = tempfile::Builder::new();
        builder.prefix("zot-export-");
        let workdir = match &env.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tokio::fs::write(workdir.path().join(DOCUMENT_FILE), &document).await?;
        if let Some(bib) = &bibliography_json {
            tokio::fs::write(workdir.path().join(BIBLIOGRAPHY_FILE), bib).await?;
        }
        if let Some(csl) = &style {
            tokio::fs::write(workdir.path().join(STYLE_FILE), csl).await?;
        }

        let engine_arg = engine
            .as_ref()
            .map(|e| e.path.to_string_lossy().into_owned());

        for format in &to_build {
            let filename = format!("{}.{}", basename, format.extension());
            let args = plan.args(*format, &filename, engine_arg.as_deref());

            stage(BuildStage::InvokingBinary);
            let format_started = Instant::now();
            let run = run_pandoc(&pandoc, &args, workdir.path(), env.config.build_timeout).await;
            let output_path = workdir.path().join(&filename);

            let outcome = match run {
                Ok(()) => deliver(*format, &filename, &output_path, request.externalize, env).await,
                Err(message) => Err(message),
            };
            match outcome {
                Ok(artifact) => {
                    debug!(
                        build_id = %build_id,
                        format = %format,
                        size = artifact.size,
                        elapsed_ms = format_started.elapsed().as_millis() as u64,
                        token = artifact.token().map(token_prefix),
                        "Format built"
                    );
                    artifacts.push(artifact);
                }
                Err(message) => {
                    warn!(build_id = %build_id, format = %format, "Format failed: {}", message);
                    warnings.push(format!("{}: {}", format, message));
                    failed_formats.push(format.to_string());
                }
            }
        }
    }

    stage(BuildStage::AssemblingResult);
    let status = if artifacts.is_empty() {
        BuildStatus::Failed
    } else {
        BuildStatus::Completed
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        build_id = %build_id,
        status = ?status,
        artifacts = artifacts.len(),
        failed = failed_formats.len(),
        elapsed_ms,
        "Document build finished"
    );

    Ok(BuildOutput {
        status,
        basename,
        artifacts,
        warnings,
        failed_formats,
        chosen_engine: engine.map(|e| e.engine.to_string()),
        elapsed_ms,
    })
}

fn attach_manual_kit(err: ZoteroMcpError, kit: serde_json::Value) -> ZoteroMcpError {
    match err {
        ZoteroMcpError::DependencyMissing {
            message,
            remediation,
            ..
        } => ZoteroMcpError::DependencyMissing {
            message,
            remediation,
            details: Some(kit),
        },
        other => other,
    }
}

/// Run one pandoc invocation in `workdir`. Errors carry a caller-facing message.
async fn run_pandoc(
    pandoc: &Path,
    args: &[String],
    workdir: &Path,
    timeout: Duration,
) -> std::result::Result<(), String> {
    let child = Command::new(pandoc)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to start pandoc: {}", e))?;

    // dropping the wait future on timeout kills the child
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| format!("pandoc did not complete: {}", e))?,
        Err(_) => return Err(format!("pandoc timed out after {}s", timeout.as_secs())),
    };

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let code = output
        .status
        .code()
        .map_or_else(|| "a signal".to_string(), |c| c.to_string());
    Err(format!(
        "pandoc exited with {}: {}",
        code,
        truncate(stderr.trim(), MAX_STDERR_CHARS)
    ))
}

async fn deliver(
    format: OutputFormat,
    filename: &str,
    path: &Path,
    externalize: bool,
    env: &BuildEnvironment<'_>,
) -> std::result::Result<BuildArtifact, String> {
    let size = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return Err(format!("pandoc reported success but {} was not written", filename)),
    };

    if !externalize && size < env.config.inline_max_bytes {
        debug!(format = %format, size, "Build stage {}", BuildStage::Inlining);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("could not read {}: {}", filename, e))?;
        return Ok(BuildArtifact::inline(format, filename.to_string(), &bytes));
    }

    debug!(format = %format, size, "Build stage {}", BuildStage::Registering);
    let entry = env
        .registry
        .store(path, filename, format.as_str())
        .await
        .map_err(|e| format!("could not register {}: {}", filename, e))?;
    let url = format!("{}/files/{}", env.public_base_url, entry.token);
    let expires_at = entry.expires_at(env.registry.ttl()).to_rfc3339();
    Ok(BuildArtifact::download(
        format,
        entry.filename,
        entry.size,
        entry.token,
        url,
        expires_at,
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::discovery::test_support::write_script;
    use super::*;

    /// Writes its own argv to the -o file; fails for outputs matching $FAIL_EXT.
    const FAKE_PANDOC: &str = r#"out=""
all="$*"
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
case "$out" in
  *.rtf) echo "rtf writer crashed" >&2; exit 42 ;;
esac
printf '%s' "$all" > "$out""#;

    struct Fixture {
        bin: tempfile::TempDir,
        temp_root: tempfile::TempDir,
        files: tempfile::TempDir,
        search_path: OsString,
        registry: FileRegistry,
        config: ExportConfig,
    }

    impl Fixture {
        fn new(with_pandoc: bool, engines: &[&str]) -> Self {
            let bin = tempfile::tempdir().unwrap();
            if with_pandoc {
                write_script(bin.path(), "pandoc", FAKE_PANDOC);
            }
            for engine in engines {
                write_script(bin.path(), engine, "exit 0");
            }
            let files = tempfile::tempdir().unwrap();
            Self {
                search_path: bin.path().as_os_str().to_os_string(),
                bin,
                temp_root: tempfile::tempdir().unwrap(),
                registry: FileRegistry::new(files.path(), Duration::from_secs(3600)),
                files,
                config: ExportConfig::default(),
            }
        }

        fn env(&self) -> BuildEnvironment<'_> {
            BuildEnvironment {
                config: &self.config,
                registry: &self.registry,
                public_base_url: "http://localhost:9180".to_string(),
                search_path: Some(self.search_path.clone()),
                temp_root: Some(self.temp_root.path().to_path_buf()),
            }
        }

        fn leftover_temp_dirs(&self) -> usize {
            std::fs::read_dir(self.temp_root.path()).unwrap().count()
        }
    }

    fn request(formats: &[&str]) -> BuildRequest {
        BuildRequest {
            document: "---\ntitle: Test Paper\n---\nText [@k1].\n".to_string(),
            formats: formats.iter().map(|s| s.to_string()).collect(),
            bibliography: Some(BibliographyPayload::Text(r#"[{"id":"k1","title":"T"}]"#.into())),
            use_citeproc: true,
            ..Default::default()
        }
    }

    // ============================================================================
    // Successful builds
    // ============================================================================

    #[tokio::test]
    async fn test_small_output_is_inlined() {
        let fx = Fixture::new(true, &[]);
        let out = build_documents(&request(&["docx"]), &fx.env()).await.unwrap();

        assert_eq!(out.status, BuildStatus::Completed);
        assert_eq!(out.basename, "Test_Paper");
        let artifact = &out.artifacts[0];
        assert_eq!(artifact.filename, "Test_Paper.docx");
        let Delivery::Inline { content_base64 } = &artifact.delivery else {
            panic!("expected inline delivery");
        };
        let argv = String::from_utf8(STANDARD.decode(content_base64).unwrap()).unwrap();
        assert!(argv.contains("--citeproc"));
        assert!(argv.contains("--bibliography refs.json"));
        assert!(fx.registry.is_empty());
        assert_eq!(fx.leftover_temp_dirs(), 0);
    }

    #[tokio::test]
    async fn test_externalize_registers_download() {
        let fx = Fixture::new(true, &[]);
        let mut req = request(&["odt"]);
        req.externalize = true;
        let out = build_documents(&req, &fx.env()).await.unwrap();

        let artifact = &out.artifacts[0];
        let Delivery::Download {
            token, download_url, ..
        } = &artifact.delivery
        else {
            panic!("expected download delivery");
        };
        assert_eq!(download_url, &format!("http://localhost:9180/files/{}", token));
        let entry = fx.registry.lookup(token).unwrap();
        assert!(entry.path.starts_with(fx.files.path()));
        assert_eq!(entry.size, artifact.size);
    }

    #[tokio::test]
    async fn test_large_output_is_registered() {
        let mut fx = Fixture::new(true, &[]);
        fx.config.inline_max_bytes = 4;
        let out = build_documents(&request(&["epub"]), &fx.env()).await.unwrap();
        assert!(out.artifacts[0].token().is_some());
        assert_eq!(fx.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_pdf_uses_resolved_engine_path() {
        let fx = Fixture::new(true, &["weasyprint"]);
        let out = build_documents(&request(&["pdf"]), &fx.env()).await.unwrap();
        assert_eq!(out.chosen_engine.as_deref(), Some("weasyprint"));
        let Delivery::Inline { content_base64 } = &out.artifacts[0].delivery else {
            panic!("expected inline delivery");
        };
        let argv = String::from_utf8(STANDARD.decode(content_base64).unwrap()).unwrap();
        assert!(argv.contains(&format!(
            "--pdf-engine={}",
            fx.bin.path().join("weasyprint").display()
        )));
    }

    // ============================================================================
    // Partial and total failure
    // ============================================================================

    #[tokio::test]
    async fn test_failed_format_is_warning() {
        let fx = Fixture::new(true, &[]);
        let out = build_documents(&request(&["docx", "rtf"]), &fx.env()).await.unwrap();
        assert_eq!(out.status, BuildStatus::Completed);
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.failed_formats, vec!["rtf"]);
        assert!(out.warnings.iter().any(|w| w.contains("rtf writer crashed")));
    }

    #[tokio::test]
    async fn test_all_formats_failed_is_failed_status() {
        let fx = Fixture::new(true, &[]);
        let out = build_documents(&request(&["rtf"]), &fx.env()).await.unwrap();
        assert_eq!(out.status, BuildStatus::Failed);
        assert!(out.artifacts.is_empty());
        assert_eq!(fx.leftover_temp_dirs(), 0);
    }

    #[tokio::test]
    async fn test_pdf_without_engine_is_skipped() {
        let fx = Fixture::new(true, &[]);
        let out = build_documents(&request(&["pdf", "docx"]), &fx.env()).await.unwrap();
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.artifacts[0].format, "docx");
        assert_eq!(out.failed_formats, vec!["pdf"]);
        assert!(out.warnings.iter().any(|w| w.contains("No PDF engine")));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_warns() {
        let mut fx = Fixture::new(false, &[]);
        write_script(fx.bin.path(), "pandoc", "sleep 30");
        fx.config.build_timeout = Duration::from_millis(200);
        let out = build_documents(&request(&["docx"]), &fx.env()).await.unwrap();
        assert_eq!(out.status, BuildStatus::Failed);
        assert!(out.warnings[0].contains("timed out"));
    }

    // ============================================================================
    // Errors before side effects
    // ============================================================================

    #[tokio::test]
    async fn test_missing_pandoc_returns_manual_kit() {
        let fx = Fixture::new(false, &[]);
        let err = build_documents(&request(&["pdf"]), &fx.env()).await.unwrap_err();
        let payload = err.payload();
        assert_eq!(payload.error_code, crate::error::ErrorCode::DependencyMissing);
        assert!(payload.remediation.is_some());
        let kit = &payload.details.unwrap()["manualBuild"];
        assert_eq!(kit["commands"][0]["argv"][0], "pandoc");
        assert_eq!(fx.leftover_temp_dirs(), 0);
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_format_has_no_side_effects() {
        let fx = Fixture::new(true, &[]);
        let err = build_documents(&request(&["docx", "html"]), &fx.env()).await.unwrap_err();
        assert!(matches!(err, ZoteroMcpError::UnsupportedFormat { .. }));
        assert_eq!(fx.leftover_temp_dirs(), 0);
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_output_redirect_rejected() {
        let fx = Fixture::new(true, &[]);
        let mut req = request(&["docx"]);
        req.extra_args = vec!["--output=/etc/x".into()];
        assert!(matches!(
            build_documents(&req, &fx.env()).await.unwrap_err(),
            ZoteroMcpError::InputShape(_)
        ));
    }

    #[test]
    fn test_artifact_serializes_one_delivery_form() {
        let inline = BuildArtifact::inline(OutputFormat::Docx, "a.docx".into(), b"hi");
        let json = serde_json::to_value(&inline).unwrap();
        assert_eq!(json["delivery"], "inline");
        assert_eq!(json["contentBase64"], "aGk=");
        assert!(json.get("token").is_none());

        let dl = BuildArtifact::download(
            OutputFormat::Pdf,
            "a.pdf".into(),
            10,
            "tok".into(),
            "http://h/files/tok".into(),
            "2026-01-01T00:00:00+00:00".into(),
        );
        let json = serde_json::to_value(&dl).unwrap();
        assert_eq!(json["downloadUrl"], "http://h/files/tok");
        assert!(json.get("contentBase64").is_none());
    }
}
