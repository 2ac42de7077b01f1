//! Bounded retry policy shared by every network call site.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ClientError, SyncError, is_transient_status};

/// Default number of attempts per call (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        base: Duration,
        /// Upper bound for any single delay.
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let exponent = retry.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << exponent).min(max)
            }
        }
    }
}

/// Max attempts, backoff schedule and the statuses considered transient.
///
/// ## Examples
///
/// ```
/// use std::time::Duration;
/// use memos_sync_lib::retry::{Backoff, RetryPolicy};
///
/// let policy = RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO));
/// assert_eq!(policy.max_attempts(), 3);
/// assert!(policy.is_retryable_status(503));
/// assert!(!policy.is_retryable_status(404));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
    retryable_status: fn(u16) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Backoff::Fixed(DEFAULT_RETRY_DELAY))
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable_status: is_transient_status,
        }
    }

    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Replaces the retryable-status predicate.
    pub fn with_retryable_status(mut self, predicate: fn(u16) -> bool) -> Self {
        self.retryable_status = predicate;
        self
    }

    /// Total attempts allowed per call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The backoff schedule.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Whether an HTTP status is worth another attempt.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        (self.retryable_status)(status)
    }

    /// Whether `err` is worth another attempt under this policy.
    pub fn should_retry(&self, err: &SyncError) -> bool {
        match err {
            SyncError::Client(ClientError::HttpStatus { status, .. }) => {
                self.is_retryable_status(*status)
            }
            SyncError::Client(other) => other.is_retryable(),
            _ => false,
        }
    }

    /// Runs `op` until it succeeds, fails permanently or attempts run out.
    ///
    /// The last error is returned once attempts are exhausted.
    ///
    /// ## Errors
    ///
    /// Returns the error of the final attempt, or the first non-retryable one.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && self.should_retry(&err) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "{what} failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "{what} gave up");
                    return Err(err);
                }
            }
        }
    }
}
