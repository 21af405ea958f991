// Cookie jar value type
// Browser-style cookies keyed by (name, domain), with domain-preference
// lookup and non-mutating merges

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{COOKIE_DOMAIN, SECURE_1PSID, SECURE_1PSIDTS};

/// A single cookie value with its path scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub value: String,
    pub path: String,
}

/// Flat record used for the (de)serialized form of a jar.
#[derive(Serialize, Deserialize)]
struct CookieRecord {
    name: String,
    domain: String,
    path: String,
    value: String,
}

/// Mapping of cookie (name, domain) pairs to values.
///
/// Used both for caller-supplied credentials and for cookies captured from
/// responses. Merging never mutates either side; a merge always produces a
/// new jar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<(String, String), Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar holding the two session cookies on the service's top-level domain.
    pub fn from_session_cookies(secure_1psid: &str, secure_1psidts: &str) -> Self {
        let mut jar = Self::new();
        jar.set(SECURE_1PSID, secure_1psid, COOKIE_DOMAIN, "/");
        jar.set(SECURE_1PSIDTS, secure_1psidts, COOKIE_DOMAIN, "/");
        jar
    }

    pub fn set(&mut self, name: &str, value: &str, domain: &str, path: &str) {
        self.cookies.insert(
            (name.to_string(), domain.to_string()),
            Cookie {
                value: value.to_string(),
                path: path.to_string(),
            },
        );
    }

    /// Value for `name` scoped to exactly `domain`.
    pub fn get_for_domain(&self, name: &str, domain: &str) -> Option<&str> {
        self.cookies
            .get(&(name.to_string(), domain.to_string()))
            .map(|c| c.value.as_str())
    }

    /// Value for `name` from any domain, preferring the service's top-level
    /// domain when the cookie exists under several scopes.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_for_domain(name, COOKIE_DOMAIN).or_else(|| {
            self.cookies
                .iter()
                .find(|((n, _), _)| n == name)
                .map(|(_, c)| c.value.as_str())
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Cache key for this jar's account: the stable session cookie,
    /// preferring the top-level-domain value. `None` when absent.
    pub fn account_key(&self) -> Option<String> {
        self.get(SECURE_1PSID).map(str::to_string)
    }

    /// New jar containing this jar's cookies with `overrides` layered on
    /// top. Conflicting (name, domain) pairs take the override's value.
    pub fn merged(&self, overrides: &CookieJar) -> CookieJar {
        let mut jar = self.clone();
        for ((name, domain), cookie) in &overrides.cookies {
            jar.cookies.insert((name.clone(), domain.clone()), cookie.clone());
        }
        jar
    }

    /// Cookie request header for a request to `host`, or `None` when no
    /// cookie in the jar is scoped to it.
    pub fn cookie_header_for(&self, host: &str) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|((_, domain), _)| domain_matches(host, domain))
            .map(|((name, _), cookie)| format!("{}={}", name, cookie.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Fold the response's Set-Cookie headers into this jar. Cookies
    /// without an explicit Domain attribute are scoped to `host`.
    pub fn absorb_response(&mut self, host: &str, response: &reqwest::Response) {
        for cookie in response.cookies() {
            let domain = cookie.domain().unwrap_or(host).to_string();
            let path = cookie.path().unwrap_or("/").to_string();
            self.set(cookie.name(), cookie.value(), &domain, &path);
        }
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Iterate as (name, domain, value).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.cookies
            .iter()
            .map(|((name, domain), cookie)| (name.as_str(), domain.as_str(), cookie.value.as_str()))
    }

    /// JSON array of cookie records, for handing a jar across process
    /// boundaries.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<CookieJar> {
        serde_json::from_str(json)
    }
}

// Jars serialize as a flat list of records; a map keyed by (name, domain)
// tuples has no JSON representation.
impl Serialize for CookieJar {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let records: Vec<CookieRecord> = self
            .cookies
            .iter()
            .map(|((name, domain), cookie)| CookieRecord {
                name: name.clone(),
                domain: domain.clone(),
                path: cookie.path.clone(),
                value: cookie.value.clone(),
            })
            .collect();
        records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CookieJar {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let records = Vec::<CookieRecord>::deserialize(deserializer)?;
        let mut jar = CookieJar::new();
        for record in records {
            jar.cookies.insert(
                (record.name, record.domain),
                Cookie {
                    value: record.value,
                    path: record.path,
                },
            );
        }
        Ok(jar)
    }
}

/// Whether a cookie scoped to `domain` is sent to `host`. A leading dot on
/// the domain is ignored, matching browser suffix rules.
pub fn domain_matches(host: &str, domain: &str) -> bool {
    if domain.is_empty() {
        return true;
    }
    let domain = domain.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{}", domain))
}
