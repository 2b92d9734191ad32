//! Error taxonomy for appliance lookups.

use thiserror::Error;

/// Result alias for lookup operations.
pub type Result<T> = std::result::Result<T, LookupError>;

/// Longest response body excerpt carried by an error.
pub const MAX_BODY_EXCERPT: usize = 512;

/// Every failure a lookup can surface.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AmbiguousMatch(String),

    #[error("error creating access request: {status} - {body}")]
    RequestCreation { status: u16, body: String },

    #[error("{0}")]
    InconsistentState(String),

    #[error("error checking out password: {status} - {body}")]
    Checkout { status: u16, body: String },

    #[error("error {operation}: {status} - {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Config(String),
}

impl LookupError {
    /// Build an [`LookupError::Api`] with a bounded body excerpt.
    pub fn api(operation: &'static str, status: u16, body: &str) -> Self {
        Self::Api {
            operation,
            status,
            body: excerpt(body),
        }
    }

    pub fn request_creation(status: u16, body: &str) -> Self {
        Self::RequestCreation {
            status,
            body: excerpt(body),
        }
    }

    pub fn checkout(status: u16, body: &str) -> Self {
        Self::Checkout {
            status,
            body: excerpt(body),
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestCreation { status, .. }
            | Self::Checkout { status, .. }
            | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether retrying the whole workflow may succeed.
    ///
    /// Only network failures and busy/unavailable appliance replies qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            _ => matches!(self.status(), Some(429 | 502 | 503 | 504)),
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LookupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Truncate a response body to [`MAX_BODY_EXCERPT`] bytes on a char boundary.
pub fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
