// Credential probing
// Races candidate credential sets against the account-scoped init endpoint
// and adopts the first one the service still accepts.

use futures::stream::{FuturesUnordered, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::task::JoinHandle;

use crate::constants::{gemini_headers, Endpoints, CONSENT_HOST, SECURE_1PSID, SECURE_1PSIDTS};
use crate::error::{GeminiError, Result};
use crate::http_client::GeminiHttpClient;

use super::cache::TokenCache;
use super::cookies::CookieJar;
use super::types::{AuthResult, Candidate, CandidateSource};

static ACCESS_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""SNlM0e":\s*"(.*?)""#).unwrap());
static BUILD_LABEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""cfb2h":\s*"(.*?)""#).unwrap());
static SESSION_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""FdrFJe":\s*"(.*?)""#).unwrap());

struct PageTokens {
    access_token: String,
    build_label: Option<String>,
    session_id: Option<String>,
}

/// Pull the three session markers out of the app page. `None` when the
/// page carries none of them (cookies rejected). The access token has been
/// absent from the page for some accounts since early 2025, so it defaults
/// to empty when the other markers are present.
fn extract_page_tokens(body: &str) -> Option<PageTokens> {
    let access_token = ACCESS_TOKEN_RE.captures(body).map(|c| c[1].to_string());
    let build_label = BUILD_LABEL_RE.captures(body).map(|c| c[1].to_string());
    let session_id = SESSION_ID_RE.captures(body).map(|c| c[1].to_string());

    if access_token.is_none() && build_label.is_none() && session_id.is_none() {
        return None;
    }

    Some(PageTokens {
        access_token: access_token.unwrap_or_default(),
        build_label,
        session_id,
    })
}

/// Probe one candidate: GET the init URL with its cookies and return the
/// page body plus the jar updated with whatever the response set.
async fn send_candidate(
    http: GeminiHttpClient,
    init_url: String,
    jar: CookieJar,
) -> Result<(String, CookieJar)> {
    let response = http.get(&init_url, gemini_headers(), &jar).await?;

    // Landing on the consent page means the cookies are expired or invalid
    // for this account, not that the request should be retried.
    let final_url = response.url().to_string();
    if final_url.contains(CONSENT_HOST) {
        return Err(GeminiError::Auth(format!(
            "Redirected to the consent page; the session cookies are expired or \
             invalid. Refresh {} and {} from the browser.",
            SECURE_1PSID, SECURE_1PSIDTS
        )));
    }

    let status = response.status();
    if !status.is_success() {
        return Err(GeminiError::Server {
            status: status.as_u16(),
            message: final_url,
        });
    }

    let host = response.url().host_str().unwrap_or_default().to_string();
    let mut resolved = jar;
    resolved.absorb_response(&host, &response);

    let body = response.text().await?;
    Ok((body, resolved))
}

/// Build the candidate credential sets to race, in construction order:
/// the base jar as-is (when complete), the base jar with a cached rotating
/// token, and - when the base jar has no session cookie - one candidate
/// per cache file. Ambient provider cookies are layered beneath each
/// candidate later, once it is known that any candidate exists at all.
fn build_candidates(
    base: &CookieJar,
    cache: &TokenCache,
    cookie_domain: &str,
    verbose: bool,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if base.contains(SECURE_1PSID) && base.contains(SECURE_1PSIDTS) {
        candidates.push(Candidate {
            source: CandidateSource::Base,
            jar: base.clone(),
        });
    } else if verbose {
        tracing::debug!(
            "Skipping base cookies: either {} or {} is not provided",
            SECURE_1PSID,
            SECURE_1PSIDTS
        );
    }

    match base.account_key() {
        Some(account_key) => {
            // Any cached token for this account seeds a candidate, fresh
            // or not - the service is the judge of validity.
            if let Some(cached) = cache.read(&account_key) {
                let mut jar = base.clone();
                jar.set(SECURE_1PSIDTS, &cached.value, cookie_domain, "/");
                candidates.push(Candidate {
                    source: CandidateSource::CachedToken,
                    jar,
                });
            } else if verbose {
                tracing::debug!("Skipping cached cookies: no cache file for this session");
            }
        }
        None => {
            let mut from_cache = 0;
            for (account_key, token) in cache.entries() {
                let mut jar = CookieJar::new();
                jar.set(SECURE_1PSID, &account_key, cookie_domain, "/");
                jar.set(SECURE_1PSIDTS, &token, cookie_domain, "/");
                candidates.push(Candidate {
                    source: CandidateSource::CacheFile,
                    jar,
                });
                from_cache += 1;
            }

            if from_cache == 0 && verbose {
                tracing::debug!(
                    "Skipping cached cookies: cookies will be cached after the first \
                     successful initialization"
                );
            }
        }
    }

    candidates
}

/// Race every candidate credential set against the init endpoint and
/// return the first one that yields session markers.
///
/// Candidates run as spawned tasks consumed in completion order. Once a
/// winner is found the remaining tasks are left to finish in the
/// background rather than cancelled - the service penalizes connections
/// that disappear mid-request.
pub async fn probe_credentials(
    http: &GeminiHttpClient,
    endpoints: &Endpoints,
    cache: &TokenCache,
    base_cookies: &CookieJar,
    account_index: u32,
    verbose: bool,
) -> Result<AuthResult> {
    let candidates = build_candidates(base_cookies, cache, &endpoints.cookie_domain, verbose);

    if candidates.is_empty() {
        return Err(GeminiError::Auth(format!(
            "No usable cookies for initialization. Pass {} and {} manually, or \
             initialize once to populate the token cache.",
            SECURE_1PSID, SECURE_1PSIDTS
        )));
    }

    // Ambient cookies from the provider home page sit beneath every
    // candidate's own cookies.
    let mut ambient = CookieJar::new();
    match http.get(&endpoints.home, gemini_headers(), &ambient).await {
        Ok(response) if response.status().is_success() => {
            let host = response.url().host_str().unwrap_or_default().to_string();
            ambient.absorb_response(&host, &response);
        }
        Ok(_) => {}
        Err(e) => {
            if verbose {
                tracing::debug!(error = %e, "Could not fetch ambient cookies; continuing without");
            }
        }
    }

    let total = candidates.len();
    let init_url = endpoints.init_url(account_index);

    let mut in_flight: FuturesUnordered<JoinHandle<Result<(String, CookieJar)>>> = candidates
        .into_iter()
        .map(|candidate| {
            if verbose {
                tracing::debug!(source = ?candidate.source, "Scheduling init attempt");
            }
            let jar = ambient.merged(&candidate.jar);
            tokio::spawn(send_candidate(http.clone(), init_url.clone(), jar))
        })
        .collect();

    let mut completed = 0usize;
    let mut last_auth_error: Option<GeminiError> = None;

    while let Some(joined) = in_flight.next().await {
        completed += 1;
        let attempt = joined
            .unwrap_or_else(|e| Err(GeminiError::Api(format!("Init attempt task failed: {}", e))));

        match attempt {
            Ok((body, cookies)) => match extract_page_tokens(&body) {
                Some(tokens) => {
                    if verbose {
                        tracing::debug!(
                            attempt = completed,
                            total,
                            "Init attempt succeeded, initializing client"
                        );
                    }
                    return Ok(AuthResult {
                        access_token: tokens.access_token,
                        build_label: tokens.build_label,
                        session_id: tokens.session_id,
                        cookies,
                    });
                }
                None => {
                    if verbose {
                        tracing::debug!(attempt = completed, total, "Init attempt failed: cookies invalid");
                    }
                    last_auth_error = None;
                }
            },
            Err(e) => {
                if verbose {
                    tracing::debug!(attempt = completed, total, error = %e, "Init attempt failed");
                }
                last_auth_error = match e {
                    err @ GeminiError::Auth(_) => Some(err),
                    _ => None,
                };
            }
        }
    }

    // The consent failure is more actionable than the generic message, but
    // only when it was the last word - every earlier candidate already got
    // its chance to succeed.
    if let Some(err) = last_auth_error {
        return Err(err);
    }

    Err(GeminiError::Auth(format!(
        "Failed to initialize a session for account index {}. The rotating token \
         expires frequently; make sure the cookie values are up to date. \
         (Failed initialization attempts: {})",
        account_index, total
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COOKIE_DOMAIN;

    #[test]
    fn test_extract_all_tokens() {
        let body = r#"...,"SNlM0e":"tok-123","cfb2h":"build-1","FdrFJe":"sess-9",..."#;
        let tokens = extract_page_tokens(body).unwrap();
        assert_eq!(tokens.access_token, "tok-123");
        assert_eq!(tokens.build_label.as_deref(), Some("build-1"));
        assert_eq!(tokens.session_id.as_deref(), Some("sess-9"));
    }

    #[test]
    fn test_extract_partial_tokens_defaults_access_token() {
        let body = r#""cfb2h":"build-only""#;
        let tokens = extract_page_tokens(body).unwrap();
        assert_eq!(tokens.access_token, "");
        assert_eq!(tokens.build_label.as_deref(), Some("build-only"));
        assert_eq!(tokens.session_id, None);
    }

    #[test]
    fn test_extract_no_tokens() {
        assert!(extract_page_tokens("<html>signed out</html>").is_none());
        assert!(extract_page_tokens("").is_none());
    }

    fn temp_cache() -> (tempfile::TempDir, TokenCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path());
        (dir, cache)
    }

    #[test]
    fn test_candidates_complete_base_only() {
        let (_dir, cache) = temp_cache();
        let base = CookieJar::from_session_cookies("psid", "psidts");

        let candidates = build_candidates(&base, &cache, COOKIE_DOMAIN, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, CandidateSource::Base);
        assert_eq!(candidates[0].jar.get(SECURE_1PSIDTS), Some("psidts"));
    }

    #[test]
    fn test_candidates_base_plus_cached_token() {
        let (_dir, cache) = temp_cache();
        cache.write("psid", "cached-token").unwrap();
        let base = CookieJar::from_session_cookies("psid", "stale-psidts");

        let candidates = build_candidates(&base, &cache, COOKIE_DOMAIN, false);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source, CandidateSource::Base);
        assert_eq!(candidates[1].source, CandidateSource::CachedToken);
        assert_eq!(candidates[1].jar.get(SECURE_1PSIDTS), Some("cached-token"));
        // Cache only overrides the rotating token; the session cookie stays.
        assert_eq!(candidates[1].jar.get(SECURE_1PSID), Some("psid"));
    }

    #[test]
    fn test_candidates_incomplete_base_with_matching_cache() {
        let (_dir, cache) = temp_cache();
        cache.write("psid", "cached-token").unwrap();

        // Session cookie present but rotating token missing: the base set
        // is skipped, the cached merge still runs.
        let mut base = CookieJar::new();
        base.set(SECURE_1PSID, "psid", COOKIE_DOMAIN, "/");

        let candidates = build_candidates(&base, &cache, COOKIE_DOMAIN, false);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, CandidateSource::CachedToken);
    }

    #[test]
    fn test_candidates_from_cache_files_when_psid_unknown() {
        let (_dir, cache) = temp_cache();
        cache.write("psid-a", "token-a").unwrap();
        cache.write("psid-b", "token-b").unwrap();

        let candidates = build_candidates(&CookieJar::new(), &cache, COOKIE_DOMAIN, false);
        assert_eq!(candidates.len(), 2);
        assert!(candidates
            .iter()
            .all(|c| c.source == CandidateSource::CacheFile));

        let psids: Vec<_> = candidates
            .iter()
            .map(|c| c.jar.get(SECURE_1PSID).unwrap())
            .collect();
        assert_eq!(psids, vec!["psid-a", "psid-b"]);
    }

    #[test]
    fn test_no_candidates() {
        let (_dir, cache) = temp_cache();
        let candidates = build_candidates(&CookieJar::new(), &cache, COOKIE_DOMAIN, false);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_ambient_cookies_sit_beneath_candidate_cookies() {
        let (_dir, cache) = temp_cache();
        let mut ambient = CookieJar::new();
        ambient.set("NID", "ambient-nid", COOKIE_DOMAIN, "/");
        ambient.set(SECURE_1PSID, "ambient-psid", COOKIE_DOMAIN, "/");

        let base = CookieJar::from_session_cookies("real-psid", "real-psidts");
        let candidates = build_candidates(&base, &cache, COOKIE_DOMAIN, false);

        // The probe layers ambient cookies beneath each candidate.
        let jar = ambient.merged(&candidates[0].jar);
        assert_eq!(jar.get("NID"), Some("ambient-nid"));
        assert_eq!(jar.get(SECURE_1PSID), Some("real-psid"));
    }
}
