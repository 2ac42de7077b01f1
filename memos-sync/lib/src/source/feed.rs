//! Records exported to a local feed file.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::RecordSource;
use crate::client::MemosClient;
use crate::error::SyncError;
use crate::fetch::FetchOutcome;
use crate::types::{AttachmentPayload, SourceRecord};

/// A JSON array or JSON Lines file of [`SourceRecord`]s.
///
/// Attachment URLs are downloaded without credentials through `downloader`.
#[derive(Debug, Clone)]
pub struct FeedFileSource {
    path: PathBuf,
    downloader: MemosClient,
}

impl FeedFileSource {
    /// Creates a source reading `path`.
    pub fn new(path: impl Into<PathBuf>, downloader: MemosClient) -> Self {
        Self {
            path: path.into(),
            downloader,
        }
    }

    /// The feed file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses feed text as a JSON array, or as one record per non-blank line.
///
/// ## Errors
///
/// Returns [`SyncError::Feed`] naming the line (for JSON Lines) that failed.
fn parse_feed(path: &Path, text: &str) -> Result<Vec<SourceRecord>, SyncError> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| SyncError::Feed {
            path: path.to_path_buf(),
            message: e.to_string(),
        });
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| SyncError::Feed {
                path: path.to_path_buf(),
                message: format!("line {}: {e}", n + 1),
            })
        })
        .collect()
}

impl RecordSource for FeedFileSource {
    fn describe(&self) -> String {
        format!("feed file {}", self.path.display())
    }

    async fn records(&self) -> Result<FetchOutcome<SourceRecord>, SyncError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let records = parse_feed(&self.path, &text)?;
        info!(path = %self.path.display(), records = records.len(), "loaded feed");
        Ok(FetchOutcome::complete(records))
    }

    async fn attachments(&self, record: &SourceRecord) -> Vec<Result<AttachmentPayload, SyncError>> {
        let mut out = Vec::with_capacity(record.attachments.len());
        for attachment in &record.attachments {
            debug!(record = %record.id, url = %attachment.url, "downloading attachment");
            out.push(self.downloader.download_url(attachment).await);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use url::Url;

    fn downloader() -> MemosClient {
        MemosClient::builder(Url::parse("http://localhost").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn parses_json_array() {
        let text = r#"[
            {"id": "a", "text": "one", "created_at": "2024-01-01T00:00:00Z"},
            {"id": "b", "text": "two", "created_at": "2024-01-02T00:00:00Z", "parent_id": "a"}
        ]"#;
        let records = parse_feed(Path::new("feed.json"), text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].parent_id.as_deref(), Some("a"));
    }

    #[test]
    fn parses_json_lines_skipping_blanks() {
        let text = "{\"id\": \"a\", \"created_at\": \"2024-01-01T00:00:00Z\", \"text\": \"x\"}\n\n\
                    {\"id\": \"b\", \"created_at\": \"2024-01-01T00:00:00Z\"}\n";
        let records = parse_feed(Path::new("feed.jsonl"), text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].text, "");
    }

    #[test]
    fn bad_line_is_reported_with_its_number() {
        let text = "{\"id\": \"a\", \"created_at\": \"2024-01-01T00:00:00Z\"}\nnot json\n";
        let err = parse_feed(Path::new("feed.jsonl"), text).unwrap_err();
        match err {
            SyncError::Feed { message, .. } => assert!(message.starts_with("line 2:")),
            other => panic!("expected feed error, got {other:?}"),
        }
    }

    #[test]
    fn empty_file_has_no_records() {
        assert!(parse_feed(Path::new("f"), "  \n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_records_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"id": "a", "text": "hello", "created_at": "2024-05-01T10:00:00Z"}}"#
        )
        .unwrap();

        let source = FeedFileSource::new(file.path(), downloader());
        let outcome = source.records().await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.items[0].text, "hello");
        assert!(source.describe().contains("feed file"));
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FeedFileSource::new(dir.path().join("absent.json"), downloader());
        assert!(matches!(source.records().await, Err(SyncError::Io(_))));
    }
}
