//! Layered error types for the sync library.
//!
//! The hierarchy mirrors the failure classes a sync run has to tell apart:
//! - [`SyncError`] - Top-level error type for all library operations
//! - [`ClientError`] - HTTP client and network errors (some retryable)
//! - [`AuthError`] - Credentials rejected by a server (always fatal)
//! - [`ConfigError`] - Missing or invalid configuration (always fatal)

mod auth_error;
mod client_error;
mod config_error;
mod sync_error;

pub use auth_error::AuthError;
pub use client_error::{ClientError, is_transient_status};
pub use config_error::ConfigError;
pub use sync_error::SyncError;
