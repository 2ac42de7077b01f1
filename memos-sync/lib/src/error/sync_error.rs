//! Top-level error type.

use std::path::PathBuf;

use thiserror::Error;

use super::{AuthError, ClientError, ConfigError};
use crate::name::NameError;
use crate::transform::TransformError;

/// Top-level error type for all sync operations.
///
/// ## Examples
///
/// ```
/// use memos_sync_lib::error::{AuthError, SyncError};
///
/// let err: SyncError = AuthError::InsufficientPermissions {
///     operation: "create memo".to_string(),
/// }
/// .into();
/// assert!(err.is_fatal());
/// assert!(!err.is_retryable());
/// ```
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP client errors (network, status, malformed body).
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Credentials rejected by a server.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Missing or invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A resource name returned by a server could not be parsed.
    #[error(transparent)]
    Name(#[from] NameError),

    /// A record could not be turned into a note payload.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A feed file could not be parsed.
    #[error("Invalid feed file {path}: {message}")]
    Feed {
        /// The feed file.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Client(ClientError::Request(err))
    }
}

impl SyncError {
    /// Returns `true` for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Client(e) if e.is_retryable())
    }

    /// Returns `true` for errors that must halt a whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }

    /// Returns `true` when a page request means "there is nothing more".
    ///
    /// Memos answers an exhausted or stale page token with 400 or 404.
    pub fn is_end_of_data(&self) -> bool {
        matches!(
            self,
            Self::Client(ClientError::HttpStatus { status: 400 | 404, .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> SyncError {
        ClientError::HttpStatus {
            status,
            message: String::new(),
        }
        .into()
    }

    #[test]
    fn transient_client_errors_are_retryable() {
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(!status(400).is_retryable());
    }

    #[test]
    fn auth_and_config_are_fatal() {
        let auth: SyncError = AuthError::AuthenticationFailed {
            url: "u".to_string(),
            message: "m".to_string(),
        }
        .into();
        let config: SyncError = ConfigError::missing("MEMOS_HOST").into();
        assert!(auth.is_fatal());
        assert!(config.is_fatal());
        assert!(!status(500).is_fatal());
    }

    #[test]
    fn bad_request_and_not_found_end_pagination() {
        assert!(status(400).is_end_of_data());
        assert!(status(404).is_end_of_data());
        assert!(!status(500).is_end_of_data());
    }

    #[test]
    fn feed_error_display_names_path() {
        let err = SyncError::Feed {
            path: PathBuf::from("/tmp/posts.jsonl"),
            message: "line 3: expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid feed file /tmp/posts.jsonl: line 3: expected value"
        );
    }
}
