//! Where records come from.
//!
//! A [`RecordSource`] yields the full record set up front (the thread
//! reconstructor needs all of it before anything is written) and downloads
//! attachments on demand, one record at a time.

mod feed;
mod memos;

pub use feed::FeedFileSource;
pub use memos::MemosSource;

use crate::error::SyncError;
use crate::fetch::FetchOutcome;
use crate::types::{AttachmentPayload, SourceRecord};

/// A source of posts to migrate.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Fetches every record.
    ///
    /// ## Errors
    ///
    /// Returns an error when the source cannot be read at all or rejects the
    /// credentials. Partial fetches are reported through the outcome.
    async fn records(&self) -> Result<FetchOutcome<SourceRecord>, SyncError>;

    /// Downloads the attachments of `record`, one result per attachment.
    async fn attachments(&self, record: &SourceRecord) -> Vec<Result<AttachmentPayload, SyncError>>;
}
