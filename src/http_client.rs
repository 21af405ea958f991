use anyhow::Context;
use reqwest::header::{HeaderMap, COOKIE};
use reqwest::{redirect, Client, Response};
use std::time::Duration;

use crate::auth::CookieJar;
use crate::config::ClientConfig;
use crate::error::{GeminiError, Result};

/// HTTP client for the Gemini web app.
///
/// Wraps a pooled reqwest client with browser-style defaults and injects
/// cookies per request from an explicit jar, so every candidate credential
/// set can ride the same connection pool. Timeouts surface as
/// `GeminiError::Timeout`, distinct from the recoverable retry kind.
#[derive(Clone)]
pub struct GeminiHttpClient {
    client: Client,
    timeout: Duration,
}

impl GeminiHttpClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .redirect(redirect::Policy::limited(10));

        if let Some(ref proxy) = config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// GET `url` carrying the jar's cookies that are scoped to its host.
    pub async fn get(&self, url: &str, headers: HeaderMap, jar: &CookieJar) -> Result<Response> {
        let mut request = self.client.get(url).headers(headers);
        if let Some(cookie_header) = host_of(url).and_then(|host| jar.cookie_header_for(host)) {
            request = request.header(COOKIE, cookie_header);
        }

        tracing::debug!(url, "Sending GET request");
        request.send().await.map_err(|e| self.map_error(e, url))
    }

    /// POST `body` to `url` carrying the jar's cookies scoped to its host.
    pub async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        jar: &CookieJar,
        body: &'static str,
    ) -> Result<Response> {
        let mut request = self.client.post(url).headers(headers).body(body);
        if let Some(cookie_header) = host_of(url).and_then(|host| jar.cookie_header_for(host)) {
            request = request.header(COOKIE, cookie_header);
        }

        tracing::debug!(url, "Sending POST request");
        request.send().await.map_err(|e| self.map_error(e, url))
    }

    fn map_error(&self, error: reqwest::Error, url: &str) -> GeminiError {
        if error.is_timeout() {
            GeminiError::Timeout(format!(
                "{} did not respond within {:?}",
                url, self.timeout
            ))
        } else {
            tracing::warn!(url, error = %error, "HTTP request error");
            GeminiError::Transport(error)
        }
    }
}

/// Host portion of a URL, without scheme, userinfo, port or path.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split("://").nth(1)?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
