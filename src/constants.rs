// Service constants
// Endpoint addresses, cookie names and browser-style request headers

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};

/// Long-lived cookie identifying the signed-in account. Never rotated;
/// also used to derive token cache file names.
pub const SECURE_1PSID: &str = "__Secure-1PSID";

/// Short-lived cookie that must be refreshed periodically to keep the
/// session authenticated.
pub const SECURE_1PSIDTS: &str = "__Secure-1PSIDTS";

/// Top-level domain the session cookies are scoped to.
pub const COOKIE_DOMAIN: &str = ".google.com";

/// Token cache files are named `{prefix}{account_key}.txt`.
pub const CACHE_FILE_PREFIX: &str = ".cached_1psidts_";
pub const CACHE_FILE_SUFFIX: &str = ".txt";

/// Host the service redirects to when cookies are expired or invalid.
pub const CONSENT_HOST: &str = "consent.google.com";

/// Fixed payload the rotation endpoint expects.
pub const ROTATE_BODY: &str = "[000,\"-0000000000000000000\"]";

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/144.0.0.0 Safari/537.36";

/// Endpoint addresses for the web app. Externally supplied and subject to
/// change; defaults target the live service.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Provider home page, fetched once per probe to pick up ambient cookies.
    pub home: String,
    /// Base of the web app, extended with `/u/{index}/app` per account.
    pub app_base: String,
    /// Cookie rotation endpoint.
    pub rotate: String,
    /// Domain the session cookies are scoped to.
    pub cookie_domain: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            home: "https://www.google.com".to_string(),
            app_base: "https://gemini.google.com".to_string(),
            rotate: "https://accounts.google.com/RotateCookies".to_string(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
        }
    }
}

impl Endpoints {
    /// Account path prefix for URLs (e.g. "/u/2", empty for index 0).
    fn account_prefix(account_index: u32) -> String {
        if account_index > 0 {
            format!("/u/{}", account_index)
        } else {
            String::new()
        }
    }

    /// Init ("who am I") URL for the given account index.
    pub fn init_url(&self, account_index: u32) -> String {
        format!(
            "{}{}/app",
            self.app_base,
            Self::account_prefix(account_index)
        )
    }
}

/// Headers sent with init/probe requests to the web app.
pub fn gemini_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded;charset=utf-8"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static("https://gemini.google.com"));
    headers.insert(
        REFERER,
        HeaderValue::from_static("https://gemini.google.com/"),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(CHROME_USER_AGENT));
    headers.insert("x-same-domain", HeaderValue::from_static("1"));
    headers
}

/// Headers sent with cookie rotation requests.
pub fn rotate_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CHROME_USER_AGENT));
    headers
}
