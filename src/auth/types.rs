// Authentication types

use super::cookies::CookieJar;

/// Outcome of a successful credential probe.
///
/// At least one of the three page markers was present in the winning
/// response; `access_token` may legitimately be empty (the service removed
/// it from the page for some accounts while the other markers remain).
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// Page access token, sent with generate requests.
    pub access_token: String,

    /// Frontend build label, when present.
    pub build_label: Option<String>,

    /// Server session id, when present.
    pub session_id: Option<String>,

    /// Cookie jar of the winning candidate, including cookies the
    /// response set on top of what was sent.
    pub cookies: CookieJar,
}

/// Where a probe candidate's credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    /// Caller-supplied cookies, used as-is.
    Base,

    /// Caller-supplied session cookie with the rotating token substituted
    /// from the on-disk cache.
    CachedToken,

    /// Both session cookies recovered from a cache file (caller supplied
    /// no session cookie).
    CacheFile,
}

/// A credential set scheduled for a probe attempt.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source: CandidateSource,
    pub jar: CookieJar,
}
