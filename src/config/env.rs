// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bind port for the file retrieval / MCP HTTP server
pub const DEFAULT_PORT: u16 = 9180;

/// Zotero library scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LibraryType {
    #[default]
    User,
    Group,
}

impl LibraryType {
    /// URL path segment used by the Web API (`users/<id>` or `groups/<id>`)
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "user" | "users" => Some(LibraryType::User),
            "group" | "groups" => Some(LibraryType::Group),
            _ => None,
        }
    }
}

/// Zotero client configuration
#[derive(Debug, Clone)]
pub struct ZoteroConfig {
    /// Library id (ZOTERO_LIBRARY_ID)
    pub library_id: Option<String>,
    /// ZOTERO_LIBRARY_TYPE
    pub library_type: LibraryType,
    /// Web API key (ZOTERO_API_KEY)
    pub api_key: Option<String>,
    /// Use the desktop client's local API (ZOTERO_LOCAL)
    pub local: bool,
    /// Outbound request timeout (ZOTERO_REQUEST_TIMEOUT)
    pub request_timeout: Duration,
}

impl Default for ZoteroConfig {
    fn default() -> Self {
        Self {
            library_id: None,
            library_type: LibraryType::User,
            api_key: None,
            local: false,
            request_timeout: crate::http::DEFAULT_TIMEOUT,
        }
    }
}

impl ZoteroConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let library_type = match read_var("ZOTERO_LIBRARY_TYPE") {
            Some(value) => LibraryType::parse(&value).unwrap_or_else(|| {
                warn!(value = %value, "Unknown ZOTERO_LIBRARY_TYPE, using 'user'");
                LibraryType::User
            }),
            None => LibraryType::User,
        };

        Self {
            library_id: read_var("ZOTERO_LIBRARY_ID"),
            library_type,
            api_key: read_var("ZOTERO_API_KEY"),
            local: parse_bool_env("ZOTERO_LOCAL").unwrap_or(false),
            request_timeout: parse_secs_env("ZOTERO_REQUEST_TIMEOUT")
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// True when enough is configured to talk to a library
    pub fn is_configured(&self) -> bool {
        self.local || (self.library_id.is_some() && self.api_key.is_some())
    }
}

/// Request cache and outbound rate limit
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// ZOTERO_CACHE_TTL
    pub ttl: Duration,
    /// ZOTERO_CACHE_MAX
    pub max_entries: usize,
    /// ZOTERO_RATE_MIN_INTERVAL
    pub rate_min_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_entries: 200,
            rate_min_interval: Duration::from_millis(200),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ttl: parse_secs_env("ZOTERO_CACHE_TTL").unwrap_or(defaults.ttl),
            max_entries: parse_num_env("ZOTERO_CACHE_MAX").unwrap_or(defaults.max_entries),
            rate_min_interval: parse_secs_env("ZOTERO_RATE_MIN_INTERVAL")
                .unwrap_or(defaults.rate_min_interval),
        }
    }
}

/// Citation suggestion ranking
#[derive(Debug, Clone)]
pub struct SuggestConfig {
    /// Rank recently searched items before asking Zotero (ZOTERO_SUGGEST_LOCAL_FIRST)
    pub local_first: bool,
    /// Best local score that avoids a server query (ZOTERO_SUGGEST_LOCAL_THRESHOLD)
    pub local_threshold: u32,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            local_first: true,
            local_threshold: 2,
        }
    }
}

impl SuggestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            local_first: parse_bool_env("ZOTERO_SUGGEST_LOCAL_FIRST").unwrap_or(defaults.local_first),
            local_threshold: parse_num_env("ZOTERO_SUGGEST_LOCAL_THRESHOLD")
                .unwrap_or(defaults.local_threshold),
        }
    }
}

/// Document build configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Explicit pandoc location (PANDOC_PATH)
    pub pandoc_path: Option<PathBuf>,
    /// Preferred PDF engine name (PDF_ENGINE)
    pub pdf_engine: Option<String>,
    /// Explicit PDF engine location (PDF_ENGINE_PATH)
    pub pdf_engine_path: Option<PathBuf>,
    /// Results at or above this size are registered instead of inlined (MCP_INLINE_MAX_BYTES)
    pub inline_max_bytes: u64,
    /// Per-format subprocess timeout (MCP_BUILD_TIMEOUT)
    pub build_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pandoc_path: None,
            pdf_engine: None,
            pdf_engine_path: None,
            inline_max_bytes: 64 * 1024,
            build_timeout: Duration::from_secs(120),
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pandoc_path: read_var("PANDOC_PATH").map(PathBuf::from),
            pdf_engine: read_var("PDF_ENGINE").map(|s| s.to_lowercase()),
            pdf_engine_path: read_var("PDF_ENGINE_PATH").map(PathBuf::from),
            inline_max_bytes: parse_num_env("MCP_INLINE_MAX_BYTES")
                .unwrap_or(defaults.inline_max_bytes),
            build_timeout: parse_secs_env("MCP_BUILD_TIMEOUT").unwrap_or(defaults.build_timeout),
        }
    }
}

/// File registry configuration
#[derive(Debug, Clone)]
pub struct FilesConfig {
    /// Storage root for registered artifacts (MCP_FILES_DIR)
    pub dir: PathBuf,
    /// Entry lifetime (MCP_FILE_TTL)
    pub ttl: Duration,
    /// Background sweep period (MCP_SWEEP_INTERVAL)
    pub sweep_interval: Duration,
    /// MCP_DELETE_AFTER_DOWNLOAD
    pub delete_after_download: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("mcp-files"),
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            delete_after_download: false,
        }
    }
}

impl FilesConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dir: read_var("MCP_FILES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.dir),
            ttl: parse_secs_env("MCP_FILE_TTL").unwrap_or(defaults.ttl),
            sweep_interval: parse_secs_env("MCP_SWEEP_INTERVAL")
                .unwrap_or(defaults.sweep_interval),
            delete_after_download: parse_bool_env("MCP_DELETE_AFTER_DOWNLOAD").unwrap_or(false),
        }
    }
}

/// HTTP bind address and public URL base
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// MCP_HOST
    pub host: String,
    /// MCP_PORT
    pub port: u16,
    /// Externally reachable base URL (MCP_PUBLIC_URL)
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: read_var("MCP_HOST").unwrap_or(defaults.host),
            port: parse_num_env("MCP_PORT").unwrap_or(defaults.port),
            public_url: read_var("MCP_PUBLIC_URL"),
        }
    }

    /// Base URL download links are built on, without a trailing slash
    pub fn public_base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" | "" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Host path mapping for `documentPath` inputs
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Root Windows drive letters are mounted under (ZOTERO_HOST_DRIVES_ROOT)
    pub host_drives_root: Option<PathBuf>,
    /// Base for relative document paths (ZOTERO_DOCS_BASE)
    pub docs_base: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env() -> Self {
        Self {
            host_drives_root: read_var("ZOTERO_HOST_DRIVES_ROOT").map(PathBuf::from),
            docs_base: read_var("ZOTERO_DOCS_BASE").map(PathBuf::from),
        }
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub zotero: ZoteroConfig,
    pub cache: CacheConfig,
    pub suggest: SuggestConfig,
    pub export: ExportConfig,
    pub files: FilesConfig,
    pub server: ServerConfig,
    pub paths: PathConfig,
    /// LOG_LEVEL
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");

        let config = Self {
            zotero: ZoteroConfig::from_env(),
            cache: CacheConfig::from_env(),
            suggest: SuggestConfig::from_env(),
            export: ExportConfig::from_env(),
            files: FilesConfig::from_env(),
            server: ServerConfig::from_env(),
            paths: PathConfig::from_env(),
            log_level: read_var("LOG_LEVEL"),
        };

        debug!(
            local = config.zotero.local,
            library_type = config.zotero.library_type.path_segment(),
            files_dir = %config.files.dir.display(),
            file_ttl_secs = config.files.ttl.as_secs(),
            inline_max_bytes = config.export.inline_max_bytes,
            "Environment configuration loaded"
        );
        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.zotero.is_configured() {
            validation.add_warning(
                "No Zotero credentials configured. Set ZOTERO_LIBRARY_ID and ZOTERO_API_KEY, or ZOTERO_LOCAL=true. Library export tools are unavailable.",
            );
        }

        if let Some(path) = &self.export.pandoc_path
            && !path.is_file()
        {
            validation.add_warning(format!(
                "PANDOC_PATH points to {}, but the file does not exist.",
                path.display()
            ));
        }

        if let Some(path) = &self.export.pdf_engine_path
            && !path.is_file()
        {
            validation.add_warning(format!(
                "PDF_ENGINE_PATH points to {}, but the file does not exist.",
                path.display()
            ));
        }

        if let Some(engine) = &self.export.pdf_engine
            && crate::export::PdfEngine::parse(engine).is_none()
        {
            validation.add_warning(format!(
                "Unknown PDF_ENGINE '{}'. Valid options: {}",
                engine,
                crate::export::PdfEngine::names().join(", ")
            ));
        }

        if self.files.dir.exists() && !self.files.dir.is_dir() {
            validation.add_error(format!(
                "MCP_FILES_DIR {} exists but is not a directory.",
                self.files.dir.display()
            ));
        }

        if self.files.ttl.is_zero() {
            validation.add_warning("MCP_FILE_TTL is 0; download tokens expire immediately.");
        }

        if let Some(url) = &self.server.public_url
            && url::Url::parse(url).is_err()
        {
            validation.add_error(format!("MCP_PUBLIC_URL '{}' is not a valid URL.", url));
        }

        validation
    }
}

/// Read a single variable, filtering empty values
fn read_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    parse_bool(&read_var(name)?)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_num_env<T: FromStr>(name: &str) -> Option<T> {
    let value = read_var(name)?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %value, "Ignoring non-numeric value");
            None
        }
    }
}

/// Seconds, fractional values allowed ("0.2")
fn parse_secs_env(name: &str) -> Option<Duration> {
    let value = read_var(name)?;
    match parse_secs(&value) {
        Some(d) => Some(d),
        None => {
            warn!(var = name, value = %value, "Ignoring invalid duration");
            None
        }
    }
}

fn parse_secs(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
