// Error handling module
// Defines the error taxonomy surfaced by client operations

use thiserror::Error;

/// Errors that can occur while talking to the Gemini web app.
#[derive(Error, Debug)]
pub enum GeminiError {
    /// Credentials are absent, expired, or were rejected by the service.
    /// Never retried automatically - the caller must supply new cookies.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A condition believed to be transient (e.g. a momentary server-side
    /// inconsistency). Retried with backoff by the retry orchestrator.
    #[error("API error: {0}")]
    Api(String),

    /// Request timed out. Not part of the automatic retry loop.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP status outside the recognized auth conditions.
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Transport-level failure from the HTTP client.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Filesystem failure in the token cache or cookie loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeminiError {
    /// Whether the retry orchestrator may retry this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GeminiError::Api(_))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, GeminiError>;
