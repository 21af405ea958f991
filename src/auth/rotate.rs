// Session token rotation
// Exchanges a stale rotating token for a fresh one and keeps the on-disk
// cache current. The rotation endpoint rate-limits aggressively, so a
// fresh cached value is always preferred over a request.

use reqwest::StatusCode;

use crate::constants::{rotate_headers, Endpoints, ROTATE_BODY, SECURE_1PSIDTS};
use crate::error::{GeminiError, Result};
use crate::http_client::GeminiHttpClient;

use super::cache::{TokenCache, FRESHNESS_WINDOW};
use super::cookies::CookieJar;

/// Rotate the session's short-lived token.
///
/// Returns the new token (or `None` when the service accepted the current
/// one as still valid - not a failure) and the cookies the response set.
/// A fresh (within [`FRESHNESS_WINDOW`]) cached token short-circuits the
/// network call entirely; a jar without a session cookie yields
/// `(None, None)`.
pub async fn rotate_session_token(
    http: &GeminiHttpClient,
    endpoints: &Endpoints,
    cache: &TokenCache,
    cookies: &CookieJar,
) -> Result<(Option<String>, Option<CookieJar>)> {
    let Some(account_key) = cookies.account_key() else {
        return Ok((None, None));
    };

    if let Some(cached) = cache.read(&account_key) {
        if cached.is_fresh(FRESHNESS_WINDOW) {
            tracing::debug!(age = ?cached.age, "Reusing cached rotating token");
            return Ok((Some(cached.value), None));
        }
    }

    let response = http
        .post(&endpoints.rotate, rotate_headers(), cookies, ROTATE_BODY)
        .await?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(GeminiError::Auth(
            "Cookie rotation failed with 401 Unauthorized".to_string(),
        ));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Cookie rotation failed");
        return Err(GeminiError::Server {
            status: status.as_u16(),
            message,
        });
    }

    let host = response.url().host_str().unwrap_or_default().to_string();
    let mut response_jar = CookieJar::new();
    response_jar.absorb_response(&host, &response);

    match response_jar.get(SECURE_1PSIDTS).map(str::to_string) {
        Some(new_token) => {
            cache.write(&account_key, &new_token)?;
            tracing::debug!("Rotated session token and updated cache");
            Ok((Some(new_token), Some(response_jar)))
        }
        // No new cookie: the current token is still considered valid.
        None => Ok((None, Some(response_jar))),
    }
}
