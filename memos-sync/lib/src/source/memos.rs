//! Another Memos instance as the source (account-to-account migration).

use chrono::Utc;
use tracing::{debug, warn};

use super::RecordSource;
use crate::client::MemosClient;
use crate::error::SyncError;
use crate::fetch::{FetchOutcome, Paginator};
use crate::name::ResourceName;
use crate::types::{AttachmentPayload, AttachmentRef, Memo, MemoAttachment, SourceRecord};

/// Every memo visible to the source token.
///
/// Record ids are memo names, and a memo whose `parent` names another memo
/// becomes a reply to it.
#[derive(Debug, Clone)]
pub struct MemosSource {
    client: MemosClient,
    paginator: Paginator,
}

impl MemosSource {
    /// Creates a source listing memos through `client`.
    pub fn new(client: MemosClient, paginator: Paginator) -> Self {
        Self { client, paginator }
    }
}

/// Maps a listed memo onto a source record.
///
/// Memos without any creation time are stamped with the current time.
pub fn memo_to_record(memo: Memo) -> SourceRecord {
    let created_at = memo.created_at().unwrap_or_else(|| {
        warn!(memo = %memo.name, "memo has no creation time, using now");
        Utc::now()
    });
    let visibility = memo.parsed_visibility();
    let attachments = memo
        .all_attachments()
        .map(|a| AttachmentRef {
            url: a.name.clone(),
            alt: String::new(),
            filename: Some(a.filename.clone()).filter(|f| !f.is_empty()),
            mime_type: Some(a.mime_type.clone()).filter(|m| !m.is_empty()),
        })
        .collect();

    SourceRecord {
        id: memo.name,
        text: memo.content,
        created_at,
        parent_id: memo.parent.filter(|p| !p.is_empty()),
        parent_author: None,
        visibility,
        attachments,
    }
}

impl RecordSource for MemosSource {
    fn describe(&self) -> String {
        format!("memos at {}", self.client.base_url())
    }

    async fn records(&self) -> Result<FetchOutcome<SourceRecord>, SyncError> {
        let client = &self.client;
        let page_size = self.paginator.page_size();
        let outcome = self
            .paginator
            .fetch_all(|token| async move { client.list_memos(page_size, token.as_deref()).await })
            .await?;
        Ok(outcome.map(memo_to_record))
    }

    async fn attachments(&self, record: &SourceRecord) -> Vec<Result<AttachmentPayload, SyncError>> {
        let listed = match ResourceName::parse(&record.id) {
            Ok(name) => self.client.list_attachments(&name).await,
            Err(err) => Err(err.into()),
        };
        let attachments: Vec<MemoAttachment> = match listed {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => inline_attachments(record),
            Err(err) if err.is_fatal() => return vec![Err(err)],
            Err(err) => {
                debug!(record = %record.id, error = %err, "listing attachments failed, using inline list");
                inline_attachments(record)
            }
        };

        let mut out = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            out.push(self.client.download_attachment(attachment).await);
        }
        out
    }
}

fn inline_attachments(record: &SourceRecord) -> Vec<MemoAttachment> {
    record
        .attachments
        .iter()
        .map(|a| MemoAttachment {
            name: a.url.clone(),
            filename: a.filename.clone().unwrap_or_default(),
            mime_type: a.mime_type.clone().unwrap_or_default(),
            external_link: None,
        })
        .collect()
}
