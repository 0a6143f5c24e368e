//! Error types for the CollabTodo auth core

use std::io;

use thiserror::Error;

/// Result type alias for the auth core
pub type Result<T> = std::result::Result<T, Error>;

/// Auth core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Required setting missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-success response from the identity provider or the API
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Transport failure, including timeouts (no response received)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body is not a valid token response
    #[error("Schema error: {0}")]
    Schema(String),

    /// Callback `state` does not belong to the pending login attempt
    #[error("State mismatch: {0}")]
    StateMismatch(String),

    /// Identity provider redirected back with `error=...`
    #[error("Authorization failed: {error} - {description}")]
    Authorization {
        /// OAuth error code
        error: String,
        /// Human-readable description
        description: String,
    },

    /// No ID token available for an authenticated request
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Key/value storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Whether the failure happened below HTTP (no response was received).
    ///
    /// Transient failures are worth retrying; explicit rejections are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(Error::Network("connection reset".to_string()).is_transient());
        assert!(!Error::Http { status: 400, body: String::new() }.is_transient());
        assert!(!Error::Schema("missing access_token".to_string()).is_transient());
        assert!(!Error::Config("client_id".to_string()).is_transient());
    }

    #[test]
    fn http_error_exposes_status_and_body() {
        let err = Error::Http {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        };
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.to_string(), r#"HTTP error 400: {"error":"invalid_grant"}"#);
        assert_eq!(Error::NotAuthenticated.status(), None);
    }
}
