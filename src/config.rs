use std::path::PathBuf;
use std::time::Duration;

use crate::constants::Endpoints;

/// Environment variable overriding the token cache directory.
pub const COOKIE_PATH_ENV: &str = "GEMINI_COOKIE_PATH";

/// Client configuration.
///
/// All values are plain fields threaded into the components that need them,
/// so tests can inject isolated cache directories and mock endpoints
/// without touching process state. The environment is consulted exactly
/// once, when the config is built.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Directory holding cached rotating tokens, one file per account.
    pub cache_dir: PathBuf,

    /// Service endpoint addresses.
    pub endpoints: Endpoints,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Optional proxy URL for all outbound requests.
    pub proxy: Option<String>,

    /// 0-based index among multiple signed-in accounts, mapped to the
    /// /u/{index}/ URL path prefix.
    pub account_index: u32,

    /// Rotate the session token in the background while the client runs.
    pub auto_refresh: bool,

    /// Interval between background rotation attempts.
    pub refresh_interval: Duration,

    /// Close the client after a period of inactivity.
    pub auto_close: bool,

    /// Idle period before auto-close fires.
    pub close_delay: Duration,

    /// Log per-candidate probe activity at debug level.
    pub verbose: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            endpoints: Endpoints::default(),
            timeout: Duration::from_secs(30),
            proxy: None,
            account_index: 0,
            auto_refresh: true,
            refresh_interval: Duration::from_secs(540),
            auto_close: false,
            close_delay: Duration::from_secs(300),
            verbose: true,
        }
    }
}

/// Resolve the cache directory: GEMINI_COOKIE_PATH when set, otherwise a
/// crate-specific subdirectory of the platform cache directory.
fn default_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var(COOKIE_PATH_ENV) {
        if !path.is_empty() {
            return expand_tilde(&path);
        }
    }

    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("gemini-webapi")
}

/// Expand tilde (~) in file paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
