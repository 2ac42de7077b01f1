//! Where notes are written.
//!
//! The driver and the cleanup commands talk to a [`Destination`] rather than
//! to [`MemosClient`] directly, so a dry run can swap in [`DryRun`] without
//! touching the control flow.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::client::MemosClient;
use crate::error::SyncError;
use crate::fetch::{FetchOutcome, Paginator};
use crate::name::ResourceName;
use crate::retry::RetryPolicy;
use crate::types::{AttachmentPayload, Memo, Visibility};

/// Write surface of a note service.
#[allow(async_fn_in_trait)]
pub trait Destination {
    /// Lists every note currently stored.
    async fn existing_notes(&self) -> Result<FetchOutcome<Memo>, SyncError>;

    /// Lists the comments already stored under `note`.
    async fn existing_comments(&self, note: &ResourceName) -> Result<Vec<Memo>, SyncError>;

    /// Creates a top-level note.
    async fn create_note(&self, content: &str, visibility: Visibility) -> Result<ResourceName, SyncError>;

    /// Creates a comment on `note`, nested under `parent` when given.
    async fn create_comment(
        &self,
        note: &ResourceName,
        parent: Option<&ResourceName>,
        content: &str,
    ) -> Result<ResourceName, SyncError>;

    /// Sets the creation time of a note or comment.
    async fn backdate(&self, name: &ResourceName, created_at: DateTime<Utc>) -> Result<(), SyncError>;

    /// Uploads an attachment linked to `owner`.
    async fn upload_attachment(
        &self,
        owner: &ResourceName,
        payload: &AttachmentPayload,
    ) -> Result<ResourceName, SyncError>;

    /// Deletes a note or comment.
    async fn delete(&self, name: &ResourceName) -> Result<(), SyncError>;
}

/// A live Memos instance. Every call goes through the retry policy.
#[derive(Debug, Clone)]
pub struct MemosDestination {
    client: MemosClient,
    paginator: Paginator,
    retry: RetryPolicy,
}

impl MemosDestination {
    /// Wraps `client`.
    pub fn new(client: MemosClient, paginator: Paginator, retry: RetryPolicy) -> Self {
        Self {
            client,
            paginator,
            retry,
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &MemosClient {
        &self.client
    }
}

impl Destination for MemosDestination {
    async fn existing_notes(&self) -> Result<FetchOutcome<Memo>, SyncError> {
        let client = &self.client;
        let page_size = self.paginator.page_size();
        self.paginator
            .fetch_all(|token| async move { client.list_memos(page_size, token.as_deref()).await })
            .await
    }

    async fn existing_comments(&self, note: &ResourceName) -> Result<Vec<Memo>, SyncError> {
        self.retry
            .run("list comments", || self.client.list_comments(note))
            .await
    }

    async fn create_note(&self, content: &str, visibility: Visibility) -> Result<ResourceName, SyncError> {
        self.retry
            .run("create note", || self.client.create_memo(content, visibility))
            .await
    }

    async fn create_comment(
        &self,
        note: &ResourceName,
        parent: Option<&ResourceName>,
        content: &str,
    ) -> Result<ResourceName, SyncError> {
        self.retry
            .run("create comment", || self.client.create_comment(note, parent, content))
            .await
    }

    async fn backdate(&self, name: &ResourceName, created_at: DateTime<Utc>) -> Result<(), SyncError> {
        self.retry
            .run("backdate", || self.client.patch_create_time(name, created_at))
            .await
    }

    async fn upload_attachment(
        &self,
        owner: &ResourceName,
        payload: &AttachmentPayload,
    ) -> Result<ResourceName, SyncError> {
        self.retry
            .run("upload attachment", || self.client.upload_attachment(owner, payload))
            .await
    }

    async fn delete(&self, name: &ResourceName) -> Result<(), SyncError> {
        self.retry
            .run("delete", || self.client.delete(name))
            .await
    }
}

/// Reads through to `inner` but only logs writes, handing out synthetic
/// names so the rest of a run proceeds as usual.
#[derive(Debug)]
pub struct DryRun<D> {
    inner: D,
    counter: AtomicUsize,
}

impl<D> DryRun<D> {
    /// Wraps a destination.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            counter: AtomicUsize::new(0),
        }
    }

    fn next_id(&self) -> String {
        format!("dry-run-{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl<D: Destination> Destination for DryRun<D> {
    async fn existing_notes(&self) -> Result<FetchOutcome<Memo>, SyncError> {
        self.inner.existing_notes().await
    }

    async fn existing_comments(&self, note: &ResourceName) -> Result<Vec<Memo>, SyncError> {
        self.inner.existing_comments(note).await
    }

    async fn create_note(&self, content: &str, visibility: Visibility) -> Result<ResourceName, SyncError> {
        let name = ResourceName::memo(self.next_id())?;
        info!(%name, %visibility, chars = content.chars().count(), "[dry run] would create note");
        Ok(name)
    }

    async fn create_comment(
        &self,
        note: &ResourceName,
        parent: Option<&ResourceName>,
        content: &str,
    ) -> Result<ResourceName, SyncError> {
        let memo_id = note.memo_id().unwrap_or_else(|| note.id()).to_string();
        let name = ResourceName::Comment {
            memo_id,
            id: self.next_id(),
        };
        info!(
            %name,
            parent = ?parent.map(ToString::to_string),
            chars = content.chars().count(),
            "[dry run] would create comment"
        );
        Ok(name)
    }

    async fn backdate(&self, name: &ResourceName, created_at: DateTime<Utc>) -> Result<(), SyncError> {
        info!(%name, %created_at, "[dry run] would backdate");
        Ok(())
    }

    async fn upload_attachment(
        &self,
        owner: &ResourceName,
        payload: &AttachmentPayload,
    ) -> Result<ResourceName, SyncError> {
        info!(%owner, filename = %payload.filename, bytes = payload.bytes.len(), "[dry run] would upload");
        Ok(ResourceName::Attachment { id: self.next_id() })
    }

    async fn delete(&self, name: &ResourceName) -> Result<(), SyncError> {
        info!(%name, "[dry run] would delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::retry::Backoff;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn destination(server: &MockServer) -> MemosDestination {
        let client = MemosClient::builder(Url::parse(&server.uri()).unwrap())
            .token("t")
            .build()
            .unwrap();
        let retry = RetryPolicy::new(3, Backoff::Fixed(Duration::ZERO));
        MemosDestination::new(client, Paginator::new(50).with_retry(retry), retry)
    }

    #[tokio::test]
    async fn create_note_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/memos"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/memos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "memos/1"})))
            .expect(1)
            .mount(&server)
            .await;

        let name = destination(&server)
            .create_note("x", Visibility::Private)
            .await
            .unwrap();
        assert_eq!(name.to_string(), "memos/1");
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let err = destination(&server)
            .create_note("x", Visibility::Private)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/memos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "memos": [{"name": "memos/1", "content": "a"}]
            })))
            .mount(&server)
            .await;
        // Any write reaching the server fails the test through `expect(0)`.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dry = DryRun::new(destination(&server));
        assert_eq!(dry.existing_notes().await.unwrap().items.len(), 1);

        let note = dry.create_note("x", Visibility::Public).await.unwrap();
        assert_eq!(note.to_string(), "memos/dry-run-1");
        let comment = dry.create_comment(&note, None, "y").await.unwrap();
        assert_eq!(comment.to_string(), "memos/dry-run-1/comments/dry-run-2");
        dry.backdate(&comment, Utc::now()).await.unwrap();
        dry.delete(&note).await.unwrap();
    }
}
