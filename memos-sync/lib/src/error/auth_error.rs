//! Authentication and authorization errors.

use thiserror::Error;

/// Errors raised when a server rejects the configured credentials.
///
/// A sync run cannot make progress once credentials are rejected, so every
/// variant is treated as fatal by the fetcher and the migration driver.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Server rejected the bearer token (HTTP 401).
    #[error("Authentication failed for {url}: {message}")]
    AuthenticationFailed {
        /// The request URL that was rejected.
        url: String,
        /// Error message from the server.
        message: String,
    },

    /// Token is valid but lacks permission for the operation (HTTP 403).
    #[error("Insufficient permissions: {operation}")]
    InsufficientPermissions {
        /// The operation that was denied.
        operation: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failed_display_includes_url() {
        let err = AuthError::AuthenticationFailed {
            url: "https://memos.example/api/v1/memos".to_string(),
            message: "token expired".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("https://memos.example/api/v1/memos"));
        assert!(display.contains("token expired"));
    }

    #[test]
    fn insufficient_permissions_display() {
        let err = AuthError::InsufficientPermissions {
            operation: "delete memos/12".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient permissions: delete memos/12");
    }
}
