// src/registry/mod.rs
// Token-addressed store for built artifacts awaiting download

mod sweeper;

pub use sweeper::{SweeperHandle, spawn_sweeper};

use crate::config::FilesConfig;
use crate::error::{Result, ZoteroMcpError};
use crate::utils::token_prefix;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Random bytes per token (43 URL-safe base64 chars)
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub token: String,
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub downloaded: bool,
}

impl FileEntry {
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn is_live(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at(ttl) >= now
    }
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// In-memory token map plus the on-disk storage root.
///
/// The map lock is never held across an await.
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    ttl: Duration,
    entries: Mutex<HashMap<String, FileEntry>>,
}

impl FileRegistry {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(config.dir.clone(), config.ttl)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FileEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an existing file and return its new token.
    pub fn register(&self, path: PathBuf, filename: &str, size: u64, format: &str) -> String {
        let token = generate_token();
        self.insert(FileEntry {
            token: token.clone(),
            path,
            filename: filename.to_string(),
            size,
            format: format.to_string(),
            created_at: Utc::now(),
            downloaded: false,
        });
        token
    }

    fn insert(&self, entry: FileEntry) {
        let token = entry.token.clone();
        let size = {
            let mut entries = self.lock();
            entries.insert(token.clone(), entry);
            entries.len()
        };
        info!(token = token_prefix(&token), registry_size = size, "Registered file");
    }

    /// Move `source` into `<root>/<token>/<filename>` and register it.
    pub async fn store(&self, source: &Path, filename: &str, format: &str) -> Result<FileEntry> {
        let token = generate_token();
        let dir = self.root.join(&token);
        tokio::fs::create_dir_all(&dir).await?;
        let dest = dir.join(filename);

        if tokio::fs::rename(source, &dest).await.is_err() {
            // cross-device: copy then drop the source
            if let Err(e) = tokio::fs::copy(source, &dest).await {
                let _ = tokio::fs::remove_dir_all(&dir).await;
                return Err(e.into());
            }
            let _ = tokio::fs::remove_file(source).await;
        }
        let size = tokio::fs::metadata(&dest).await?.len();

        let entry = FileEntry {
            token,
            path: dest,
            filename: filename.to_string(),
            size,
            format: format.to_string(),
            created_at: Utc::now(),
            downloaded: false,
        };
        self.insert(entry.clone());
        Ok(entry)
    }

    /// Live entry for `token`; expired entries are evicted.
    pub fn get(&self, token: &str) -> Option<FileEntry> {
        self.get_at(token, Utc::now())
    }

    pub fn get_at(&self, token: &str, now: DateTime<Utc>) -> Option<FileEntry> {
        let expired = {
            let mut entries = self.lock();
            match entries.get(token) {
                Some(entry) if entry.is_live(self.ttl, now) => return Some(entry.clone()),
                Some(_) => entries.remove(token),
                None => None,
            }
        };
        if let Some(entry) = expired {
            debug!(token = token_prefix(token), "Evicting expired file");
            remove_files(&entry);
        }
        None
    }

    /// Live entry whose backing file still exists.
    ///
    /// An entry whose file has disappeared is evicted and reported as gone.
    pub fn lookup(&self, token: &str) -> Result<FileEntry> {
        let entry = self.get(token).ok_or(ZoteroMcpError::TokenNotFound)?;
        if entry.path.is_file() {
            return Ok(entry);
        }
        warn!(token = token_prefix(token), "Backing file missing, evicting");
        self.cleanup(token);
        Err(ZoteroMcpError::TokenGone)
    }

    /// Like [`lookup`](Self::lookup), but flags the entry as downloaded under the
    /// same lock that checks it. Only the first caller gets the entry; later
    /// callers get `TokenGone`.
    pub fn claim_download(&self, token: &str) -> Result<FileEntry> {
        self.lookup(token)?;
        let mut entries = self.lock();
        let entry = entries.get_mut(token).ok_or(ZoteroMcpError::TokenNotFound)?;
        if entry.downloaded {
            return Err(ZoteroMcpError::TokenGone);
        }
        entry.downloaded = true;
        Ok(entry.clone())
    }

    pub fn mark_downloaded(&self, token: &str) {
        if let Some(entry) = self.lock().get_mut(token) {
            entry.downloaded = true;
        }
    }

    /// Drop the entry and its file. Filesystem failures are logged, not returned.
    pub fn cleanup(&self, token: &str) -> bool {
        let removed = self.lock().remove(token);
        match removed {
            Some(entry) => {
                remove_files(&entry);
                true
            }
            None => false,
        }
    }

    /// Remove `token` after `delay`, off the calling task.
    pub fn schedule_cleanup(self: &Arc<Self>, token: String, delay: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if registry.cleanup(&token) {
                info!(token = token_prefix(&token), "Removed file after download");
            }
        });
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<FileEntry> = {
            let mut entries = self.lock();
            let tokens: Vec<String> = entries
                .iter()
                .filter(|(_, e)| !e.is_live(self.ttl, now))
                .map(|(t, _)| t.clone())
                .collect();
            tokens.iter().filter_map(|t| entries.remove(t)).collect()
        };
        for entry in &expired {
            remove_files(entry);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Remove the file and its token directory if that is now empty.
fn remove_files(entry: &FileEntry) {
    if let Err(e) = std::fs::remove_file(&entry.path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(token = token_prefix(&entry.token), error = %e, "Failed to remove file");
    }
    if let Some(dir) = entry.path.parent() {
        // only succeeds when empty
        let _ = std::fs::remove_dir(dir);
    }
}
