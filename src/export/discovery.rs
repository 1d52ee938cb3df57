// src/export/discovery.rs
// Locating pandoc and a PDF engine without touching the process environment

use super::format::PdfEngine;
use crate::config::ExportConfig;
use crate::error::{Result, ZoteroMcpError};
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A PDF engine the build can hand to pandoc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEngine {
    pub engine: PdfEngine,
    pub path: PathBuf,
}

/// The process `PATH`, captured once and passed down explicitly.
pub fn current_search_path() -> Option<OsString> {
    std::env::var_os("PATH")
}

/// Find an executable by override or by name on `search_path`.
///
/// An override is used as-is when it is a file, and never falls back to the search path.
pub fn resolve_binary(
    override_path: Option<&Path>,
    names: &[&str],
    search_path: Option<&OsStr>,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return path.is_file().then(|| path.to_path_buf());
    }
    let search_path = search_path?;
    for dir in std::env::split_paths(search_path) {
        for name in names {
            for candidate in candidates(&dir, name) {
                if is_executable(&candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(name)];
    if cfg!(windows) {
        out.push(dir.join(format!("{name}.exe")));
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Locate pandoc, or fail with a `DependencyMissing` error.
pub fn find_pandoc(config: &ExportConfig, search_path: Option<&OsStr>) -> Result<PathBuf> {
    if let Some(explicit) = &config.pandoc_path {
        return resolve_binary(Some(explicit), &[], None).ok_or_else(|| {
            ZoteroMcpError::DependencyMissing {
                message: format!(
                    "PANDOC_PATH points to {}, but the file does not exist.",
                    explicit.display()
                ),
                remediation: Some("Fix PANDOC_PATH or unset it to search PATH.".to_string()),
                details: None,
            }
        });
    }
    resolve_binary(None, &["pandoc"], search_path).ok_or_else(|| {
        ZoteroMcpError::DependencyMissing {
            message: "Pandoc not found on server.".to_string(),
            remediation: Some(
                "Install pandoc or set PANDOC_PATH to its location, or build locally with the manual kit in details."
                    .to_string(),
            ),
            details: None,
        }
    })
}

/// Pick a PDF engine: configured, then requested, then default order.
///
/// Warnings describe overrides that could not be used.
pub fn resolve_pdf_engine(
    config: &ExportConfig,
    requested: Option<PdfEngine>,
    search_path: Option<&OsStr>,
) -> (Option<ResolvedEngine>, Vec<String>) {
    let mut warnings = Vec::new();
    let configured = config.pdf_engine.as_deref().and_then(PdfEngine::parse);

    let override_path = match &config.pdf_engine_path {
        Some(path) if path.is_file() => Some(path.as_path()),
        Some(path) => {
            warnings.push(format!(
                "PDF_ENGINE_PATH set to {} but the file does not exist.",
                path.display()
            ));
            None
        }
        None => None,
    };

    // which engine the override file is
    let override_engine = override_path.and_then(|path| {
        configured.or_else(|| {
            path.file_name()
                .and_then(OsStr::to_str)
                .and_then(PdfEngine::from_file_name)
        })
    });

    let available = |engine: PdfEngine| -> Option<ResolvedEngine> {
        if let (Some(path), Some(e)) = (override_path, override_engine)
            && e == engine
        {
            return Some(ResolvedEngine {
                engine,
                path: path.to_path_buf(),
            });
        }
        resolve_binary(None, &[engine.as_str()], search_path).map(|path| ResolvedEngine { engine, path })
    };

    let order = configured
        .into_iter()
        .chain(requested)
        .chain(PdfEngine::PREFERENCE);
    for engine in order {
        if let Some(found) = available(engine) {
            return (Some(found), warnings);
        }
    }

    warnings.push(
        "No PDF engine found (wkhtmltopdf/weasyprint/xelatex). PDF output was skipped.".to_string(),
    );
    (None, warnings)
}

/// First line of `<binary> --version`, if it answers in time.
pub async fn probe_version(binary: &Path) -> Option<String> {
    let child = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;
    let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script.
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::test_support::write_script;
    use super::*;

    fn config() -> ExportConfig {
        ExportConfig::default()
    }

    // ============================================================================
    // resolve_binary
    // ============================================================================

    #[test]
    fn test_resolve_binary_search_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_script(b.path(), "pandoc", "exit 0");
        let path = std::env::join_paths([a.path(), b.path()]).unwrap();

        assert_eq!(
            resolve_binary(None, &["pandoc"], Some(&path)),
            Some(b.path().join("pandoc"))
        );
        assert_eq!(resolve_binary(None, &["pandoc"], None), None);
    }

    #[test]
    fn test_non_executable_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pandoc"), "not executable").unwrap();
        let path = dir.path().as_os_str().to_os_string();
        assert_eq!(resolve_binary(None, &["pandoc"], Some(&path)), None);
    }

    // ============================================================================
    // find_pandoc
    // ============================================================================

    #[test]
    fn test_missing_override_is_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "pandoc", "exit 0");
        let cfg = ExportConfig {
            pandoc_path: Some(dir.path().join("missing-pandoc")),
            ..config()
        };
        let path = dir.path().as_os_str().to_os_string();
        let err = find_pandoc(&cfg, Some(&path)).unwrap_err();
        assert!(err.to_string().contains("PANDOC_PATH"));
    }

    #[test]
    fn test_no_pandoc_on_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().as_os_str().to_os_string();
        assert!(matches!(
            find_pandoc(&config(), Some(&path)),
            Err(ZoteroMcpError::DependencyMissing { .. })
        ));
    }

    // ============================================================================
    // resolve_pdf_engine
    // ============================================================================

    #[test]
    fn test_default_order_prefers_wkhtmltopdf() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "xelatex", "exit 0");
        write_script(dir.path(), "wkhtmltopdf", "exit 0");
        let path = dir.path().as_os_str().to_os_string();

        let (engine, warnings) = resolve_pdf_engine(&config(), None, Some(&path));
        assert_eq!(engine.unwrap().engine, PdfEngine::Wkhtmltopdf);
        assert!(warnings.is_empty());

        let (engine, _) = resolve_pdf_engine(&config(), Some(PdfEngine::Xelatex), Some(&path));
        assert_eq!(engine.unwrap().engine, PdfEngine::Xelatex);
    }

    #[test]
    fn test_configured_engine_wins_over_request() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "weasyprint", "exit 0");
        write_script(dir.path(), "xelatex", "exit 0");
        let path = dir.path().as_os_str().to_os_string();
        let cfg = ExportConfig {
            pdf_engine: Some("weasyprint".into()),
            ..config()
        };
        let (engine, _) = resolve_pdf_engine(&cfg, Some(PdfEngine::Xelatex), Some(&path));
        assert_eq!(engine.unwrap().engine, PdfEngine::Weasyprint);
    }

    #[test]
    fn test_engine_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let custom = write_script(dir.path(), "xelatex-custom", "exit 0");
        let cfg = ExportConfig {
            pdf_engine_path: Some(custom.clone()),
            ..config()
        };
        let (engine, _) = resolve_pdf_engine(&cfg, None, None);
        let engine = engine.unwrap();
        assert_eq!(engine.engine, PdfEngine::Xelatex);
        assert_eq!(engine.path, custom);
    }

    #[test]
    fn test_no_engine_warns() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ExportConfig {
            pdf_engine_path: Some(dir.path().join("gone")),
            ..config()
        };
        let path = dir.path().as_os_str().to_os_string();
        let (engine, warnings) = resolve_pdf_engine(&cfg, None, Some(&path));
        assert!(engine.is_none());
        assert_eq!(warnings.len(), 2);
    }

    // ============================================================================
    // probe_version
    // ============================================================================

    #[tokio::test]
    async fn test_probe_version_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let bin = write_script(dir.path(), "pandoc", "echo 'pandoc 3.1.9'\necho 'Features: +server'");
        assert_eq!(probe_version(&bin).await.as_deref(), Some("pandoc 3.1.9"));

        let failing = write_script(dir.path(), "broken", "exit 3");
        assert_eq!(probe_version(&failing).await, None);
    }
}
