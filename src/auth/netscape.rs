// Netscape cookie file parsing
// Loads cookies.txt files exported by browser extensions: seven
// tab-separated fields per line (domain, domain_specified, path, secure,
// expiration, name, value)

use std::path::Path;

use crate::error::Result;

use super::cookies::CookieJar;

/// Load cookies from a Netscape/Mozilla format cookie file.
///
/// `domain_filter`, when given, keeps only cookies whose domain contains
/// the filter string (case-insensitive), e.g. "google" to match
/// .google.com and accounts.google.com alike.
pub fn load_netscape_cookies(path: impl AsRef<Path>, domain_filter: Option<&str>) -> Result<CookieJar> {
    let content = std::fs::read_to_string(path.as_ref())?;
    Ok(parse_netscape_cookies(&content, domain_filter))
}

/// Parse Netscape cookie file content. Header lines, comments and
/// malformed lines are skipped.
pub fn parse_netscape_cookies(content: &str, domain_filter: Option<&str>) -> CookieJar {
    let mut jar = CookieJar::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 7 {
            continue;
        }

        let domain = parts[0];
        let path = parts[2];
        let name = parts[5];
        let value = parts[6];

        if let Some(filter) = domain_filter {
            if !domain.to_lowercase().contains(&filter.to_lowercase()) {
                continue;
            }
        }

        jar.set(name, value, domain, path);
    }

    jar
}
