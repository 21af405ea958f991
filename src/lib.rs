// Gemini web app client - library root
//
// The web app has no formal API; authentication rides on browser session
// cookies, one of which rotates frequently. This crate keeps a long-lived
// client authenticated: it races candidate credential sets, caches rotated
// tokens on disk, refreshes them in the background, and retries wrapped
// operations when the session drops.

pub mod auth;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod http_client;
pub mod retry;

pub use auth::{
    load_netscape_cookies, parse_netscape_cookies, probe_credentials, rotate_session_token,
    AuthResult, CookieJar, TokenCache, FRESHNESS_WINDOW,
};
pub use client::GeminiClient;
pub use config::ClientConfig;
pub use constants::Endpoints;
pub use error::{GeminiError, Result};
pub use retry::{Retry, DELAY_FACTOR};
