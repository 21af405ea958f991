// Token cache
// Per-account persistent store for the rotating session token. One file
// per account key; readers never observe a partial value because writes go
// through a temp file renamed into place.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use crate::constants::{CACHE_FILE_PREFIX, CACHE_FILE_SUFFIX};
use crate::error::{GeminiError, Result};

/// Maximum age at which a cached rotating token is reused without
/// contacting the rotation endpoint.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(60);

/// A cached token together with its on-disk age.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub value: String,
    pub age: Duration,
}

impl CachedToken {
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age <= window
    }
}

/// Disk-backed store of rotated session tokens, keyed by account.
///
/// The directory is shared mutable state across probes, rotations and
/// client instances; writes are last-writer-wins. Stale files are treated
/// as cache misses for the freshness check but still seed probe candidates.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, account_key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}{}", CACHE_FILE_PREFIX, account_key, CACHE_FILE_SUFFIX))
    }

    /// Read the cached token for an account. Returns `None` when the file
    /// is absent or empty; never errors.
    pub fn read(&self, account_key: &str) -> Option<CachedToken> {
        let path = self.file_for(account_key);
        let value = std::fs::read_to_string(&path).ok()?;
        if value.is_empty() {
            return None;
        }

        let age = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or_default();

        Some(CachedToken { value, age })
    }

    /// Whether a cached token exists and is no older than `window`.
    pub fn is_fresh(&self, account_key: &str, window: Duration) -> bool {
        self.read(account_key)
            .map(|token| token.is_fresh(window))
            .unwrap_or(false)
    }

    /// Write the token for an account, replacing any prior value.
    ///
    /// The token lands in a temp file that is fixed to owner-only
    /// permissions and then renamed over the target, so concurrent readers
    /// see either the old or the new value, never a partial one.
    pub fn write(&self, account_key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(self.file_for(account_key))
            .map_err(|e| GeminiError::Io(e.error))?;

        tracing::debug!(account_key_len = account_key.len(), "Cached rotated token");
        Ok(())
    }

    /// Enumerate every cached (account key, token) pair. Re-scans the
    /// directory on each call; empty files are skipped.
    pub fn entries(&self) -> Vec<(String, String)> {
        let Ok(dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        for entry in dir.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(key) = name
                .strip_prefix(CACHE_FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(CACHE_FILE_SUFFIX))
            else {
                continue;
            };

            if let Ok(value) = std::fs::read_to_string(entry.path()) {
                if !value.is_empty() {
                    entries.push((key.to_string(), value));
                }
            }
        }

        entries.sort();
        entries
    }
}
