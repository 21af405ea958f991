// Authentication module
// Credential jars, the on-disk token cache, concurrent probing and
// session token rotation

mod cache;
mod cookies;
mod netscape;
mod probe;
mod rotate;
mod types;

pub use cache::{CachedToken, TokenCache, FRESHNESS_WINDOW};
pub use cookies::{domain_matches, Cookie, CookieJar};
pub use netscape::{load_netscape_cookies, parse_netscape_cookies};
pub use probe::probe_credentials;
pub use rotate::rotate_session_token;
pub use types::{AuthResult, Candidate, CandidateSource};
