//! HTTP client and network errors.

use thiserror::Error;

/// Errors from the HTTP client layer.
///
/// These errors represent network-level failures, HTTP status errors,
/// and malformed response bodies.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed due to network or protocol error.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned a non-success HTTP status code.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// The HTTP status code returned.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Failed to build or reach the request URL.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Response body did not have the expected shape.
    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse {
        /// The request URL.
        url: String,
        /// What was wrong with the body.
        message: String,
    },
}

impl ClientError {
    /// Returns `true` if this error is transient and the call may be retried.
    ///
    /// Connection failures, timeouts, HTTP 429 and 5xx are transient;
    /// every other status and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::HttpStatus { status, .. } => is_transient_status(*status),
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::UnexpectedResponse { .. } => false,
        }
    }

    /// Returns the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Default retryable-status predicate: rate limiting and server errors.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}
