//! Token-driven pagination with bounded retry.
//!
//! [`Paginator::fetch_all`] follows continuation tokens until the server runs
//! out of data. Transient failures retry the same page; once retries are
//! exhausted, the records gathered so far are returned and the outcome is
//! marked incomplete. Only fatal errors (rejected credentials) surface as
//! `Err`.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::retry::RetryPolicy;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default page ceiling.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// One page of results plus the token for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Records on this page, in server order.
    pub items: Vec<T>,
    /// Continuation token; `None` on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A page with no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The last page carried no continuation token.
    NoMoreTokens,
    /// The server returned a page with no records.
    EmptyPage,
    /// The server answered 400/404, meaning there is nothing more.
    EndOfData,
    /// The server handed back the token it was just given.
    RepeatedToken,
    /// The page ceiling was reached.
    PageLimit,
    /// A page kept failing after every retry.
    Failed {
        /// 1-based number of the page that failed.
        page: usize,
        /// The last error.
        message: String,
    },
}

impl StopReason {
    /// Whether pagination ran to the natural end of the data.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::NoMoreTokens | Self::EmptyPage | Self::EndOfData)
    }
}

/// Everything fetched, and how the fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome<T> {
    /// Records in server order.
    pub items: Vec<T>,
    /// Number of pages that returned successfully.
    pub pages: usize,
    /// Why pagination stopped.
    pub stop: StopReason,
}

impl<T> FetchOutcome<T> {
    /// An outcome holding `items` with no pagination involved.
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            pages: 1,
            stop: StopReason::NoMoreTokens,
        }
    }

    /// Whether every record the source had was retrieved.
    pub fn is_complete(&self) -> bool {
        self.stop.is_complete()
    }

    /// Transforms the items, keeping the pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> FetchOutcome<U> {
        FetchOutcome {
            items: self.items.into_iter().map(f).collect(),
            pages: self.pages,
            stop: self.stop,
        }
    }
}

/// Pagination settings shared by every paged listing.
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: u32,
    max_pages: usize,
    retry: RetryPolicy,
    page_delay: Duration,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            retry: RetryPolicy::default(),
            page_delay: Duration::ZERO,
        }
    }
}

impl Paginator {
    /// A paginator requesting `page_size` records per page.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Self::default()
        }
    }

    /// Sets the page ceiling.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Sets the retry policy applied to each page.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the pause between consecutive page requests.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Records requested per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches every page through `fetch_page`, which receives the
    /// continuation token (`None` for the first page).
    ///
    /// ## Errors
    ///
    /// Returns an error only when a page fails with a fatal error
    /// (authentication). Every other failure ends pagination and is reported
    /// through [`FetchOutcome::stop`].
    ///
    /// ## Examples
    ///
    /// ```
    /// use memos_sync_lib::fetch::{Page, Paginator};
    ///
    /// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    /// # rt.block_on(async {
    /// let outcome = Paginator::new(2)
    ///     .fetch_all(|token| async move {
    ///         Ok(match token.as_deref() {
    ///             None => Page { items: vec![1, 2], next_token: Some("p2".into()) },
    ///             _ => Page::last(vec![3]),
    ///         })
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(outcome.items, vec![1, 2, 3]);
    /// assert!(outcome.is_complete());
    /// # });
    /// ```
    pub async fn fetch_all<T, F, Fut>(&self, mut fetch_page: F) -> Result<FetchOutcome<T>, SyncError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, SyncError>>,
    {
        let mut items = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;

        let stop = loop {
            if pages >= self.max_pages {
                warn!(max_pages = self.max_pages, "page limit reached, stopping early");
                break StopReason::PageLimit;
            }
            if pages > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page_number = pages + 1;
            let result = self
                .retry
                .run("page fetch", || fetch_page(token.clone()))
                .await;

            match result {
                Ok(page) => {
                    pages = page_number;
                    if page.items.is_empty() {
                        debug!(page = page_number, "empty page");
                        break StopReason::EmptyPage;
                    }
                    items.extend(page.items);
                    info!(page = page_number, total = items.len(), "fetched page");
                    match page.next_token {
                        None => break StopReason::NoMoreTokens,
                        Some(next) if token.as_deref() == Some(next.as_str()) => {
                            warn!(page = page_number, "server repeated its page token");
                            break StopReason::RepeatedToken;
                        }
                        Some(next) => token = Some(next),
                    }
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) if err.is_end_of_data() => {
                    debug!(page = page_number, error = %err, "end of data");
                    break StopReason::EndOfData;
                }
                Err(err) => {
                    warn!(
                        page = page_number,
                        kept = items.len(),
                        error = %err,
                        "page failed after retries, keeping partial results"
                    );
                    break StopReason::Failed {
                        page: page_number,
                        message: err.to_string(),
                    };
                }
            }
        };

        Ok(FetchOutcome { items, pages, stop })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::{AuthError, ClientError};
    use crate::retry::Backoff;

    fn status(status: u16) -> SyncError {
        ClientError::HttpStatus {
            status,
            message: String::new(),
        }
        .into()
    }

    fn page(items: &[u32], next: Option<&str>) -> Result<Page<u32>, SyncError> {
        Ok(Page {
            items: items.to_vec(),
            next_token: next.map(str::to_string),
        })
    }

    fn paginator() -> Paginator {
        Paginator::new(10).with_retry(RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO)))
    }

    async fn run(
        paginator: &Paginator,
        script: Vec<Result<Page<u32>, SyncError>>,
    ) -> (Result<FetchOutcome<u32>, SyncError>, Vec<Option<String>>) {
        let mut script: VecDeque<_> = script.into();
        let mut tokens = Vec::new();
        let outcome = paginator
            .fetch_all(|token| {
                tokens.push(token);
                let next = script.pop_front().unwrap_or_else(|| Ok(Page::last(Vec::new())));
                async move { next }
            })
            .await;
        (outcome, tokens)
    }

    #[tokio::test]
    async fn follows_tokens_until_absent() {
        let (outcome, tokens) = run(
            &paginator(),
            vec![page(&[1, 2], Some("a")), page(&[3], Some("b")), page(&[4], None)],
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1, 2, 3, 4]);
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.stop, StopReason::NoMoreTokens);
        assert_eq!(tokens, vec![None, Some("a".into()), Some("b".into())]);
    }

    #[tokio::test]
    async fn empty_page_stops() {
        let (outcome, _) = run(&paginator(), vec![page(&[1], Some("a")), page(&[], Some("b"))]).await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1]);
        assert_eq!(outcome.stop, StopReason::EmptyPage);
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn not_found_is_end_of_data() {
        let (outcome, tokens) = run(&paginator(), vec![page(&[1], Some("a")), Err(status(404))]).await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1]);
        assert_eq!(outcome.stop, StopReason::EndOfData);
        assert!(outcome.is_complete());
        assert_eq!(tokens.len(), 2, "404 is not retried");
    }

    #[tokio::test]
    async fn transient_failures_retry_same_page() {
        let (outcome, tokens) = run(
            &paginator(),
            vec![
                page(&[1], Some("a")),
                Err(status(503)),
                Err(status(429)),
                page(&[2], None),
            ],
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1, 2]);
        assert!(outcome.is_complete());
        assert_eq!(
            tokens,
            vec![None, Some("a".into()), Some("a".into()), Some("a".into())]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_keep_partial_results() {
        let (outcome, _) = run(
            &paginator(),
            vec![
                page(&[1, 2], Some("a")),
                Err(status(500)),
                Err(status(500)),
                Err(status(500)),
            ],
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1, 2]);
        assert!(!outcome.is_complete());
        assert!(matches!(outcome.stop, StopReason::Failed { page: 2, .. }));
    }

    #[tokio::test]
    async fn auth_failure_is_an_error() {
        let auth: SyncError = AuthError::AuthenticationFailed {
            url: "u".to_string(),
            message: "no".to_string(),
        }
        .into();
        let (outcome, _) = run(&paginator(), vec![page(&[1], Some("a")), Err(auth)]).await;
        assert!(outcome.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn page_limit_marks_incomplete() {
        let paginator = paginator().with_max_pages(2);
        let (outcome, _) = run(
            &paginator,
            vec![page(&[1], Some("a")), page(&[2], Some("b")), page(&[3], None)],
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1, 2]);
        assert_eq!(outcome.stop, StopReason::PageLimit);
        assert!(!outcome.is_complete());
    }

    #[tokio::test]
    async fn repeated_token_stops() {
        let (outcome, _) = run(
            &paginator(),
            vec![page(&[1], Some("a")), page(&[2], Some("a"))],
        )
        .await;
        let outcome = outcome.unwrap();
        assert_eq!(outcome.items, vec![1, 2]);
        assert_eq!(outcome.stop, StopReason::RepeatedToken);
    }

    #[tokio::test(start_paused = true)]
    async fn page_delay_is_applied_between_pages() {
        let paginator = paginator().with_page_delay(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        let (outcome, _) = run(&paginator, vec![page(&[1], Some("a")), page(&[2], None)]).await;
        assert_eq!(outcome.unwrap().items, vec![1, 2]);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
