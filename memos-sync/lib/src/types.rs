//! Core data types shared by sources, the destination and the driver.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who can see a memo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    /// Only the owner.
    #[default]
    Private,
    /// Signed-in users of the instance.
    Protected,
    /// Everyone.
    Public,
}

impl Visibility {
    /// The wire representation used by the Memos API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "PRIVATE",
            Self::Protected => "PROTECTED",
            Self::Public => "PUBLIC",
        }
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRIVATE" => Ok(Self::Private),
            "PROTECTED" => Ok(Self::Protected),
            "PUBLIC" => Ok(Self::Public),
            other => Err(format!(
                "unknown visibility '{other}', expected PRIVATE, PROTECTED or PUBLIC"
            )),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to media attached to a source post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Where the media can be downloaded.
    pub url: String,
    /// Alternative text, if the source provided any.
    #[serde(default)]
    pub alt: String,
    /// Preferred filename; derived from the URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Declared MIME type; sniffed from the response when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AttachmentRef {
    /// Creates a reference with only a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alt: String::new(),
            filename: None,
            mime_type: None,
        }
    }
}

/// A single post fetched from a source, before any transformation.
///
/// ## Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use memos_sync_lib::SourceRecord;
///
/// let root = SourceRecord::new("a", "hello", Utc.timestamp_opt(1, 0).unwrap());
/// let reply = SourceRecord::new("b", "again", Utc.timestamp_opt(2, 0).unwrap())
///     .with_parent("a");
/// assert!(root.parent_id.is_none());
/// assert_eq!(reply.parent_id.as_deref(), Some("a"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Opaque source identifier, unique within one fetch.
    pub id: String,
    /// The post body.
    #[serde(default)]
    pub text: String,
    /// When the post was created at the source.
    pub created_at: DateTime<Utc>,
    /// Source id of the post this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Author of the parent post, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_author: Option<String>,
    /// Visibility to carry over; falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Media attached to the post, in source order.
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
}

impl SourceRecord {
    /// Creates a root record with no attachments.
    pub fn new(id: impl Into<String>, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            created_at,
            parent_id: None,
            parent_author: None,
            visibility: None,
            attachments: Vec::new(),
        }
    }

    /// Marks the record as a reply to `parent_id`.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Records who authored the parent post.
    pub fn with_parent_author(mut self, author: impl Into<String>) -> Self {
        self.parent_author = Some(author.into());
        self
    }

    /// Appends an attachment reference.
    pub fn with_attachment(mut self, attachment: AttachmentRef) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Downloaded attachment bytes, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPayload {
    /// Filename to store at the destination.
    pub filename: String,
    /// MIME type.
    pub mime_type: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl AttachmentPayload {
    /// Base64 encoding used by the attachment upload endpoint.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// An attachment as listed by the Memos API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoAttachment {
    /// Resource name, e.g. `attachments/abc`.
    pub name: String,
    /// Original filename.
    #[serde(default)]
    pub filename: String,
    /// MIME type.
    #[serde(default, rename = "type")]
    pub mime_type: String,
    /// Link for attachments stored outside the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_link: Option<String>,
}

impl MemoAttachment {
    /// Signature used by fingerprints: `filename:type`.
    pub fn signature(&self) -> String {
        let filename = if self.filename.is_empty() {
            self.name.as_str()
        } else {
            self.filename.as_str()
        };
        let mime = if self.mime_type.is_empty() {
            "unknown"
        } else {
            self.mime_type.as_str()
        };
        format!("{filename}:{mime}")
    }
}

/// A memo as returned by `GET /api/v1/memos`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    /// Resource name, e.g. `memos/42`.
    pub name: String,
    /// Markdown body.
    #[serde(default)]
    pub content: String,
    /// Creation time (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    /// Creation time as unix seconds, reported by older servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_ts: Option<i64>,
    /// Raw visibility string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    /// Name of the memo this one comments on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Attachments (current servers).
    #[serde(default)]
    pub attachments: Vec<MemoAttachment>,
    /// Attachments (older servers call them resources).
    #[serde(default)]
    pub resources: Vec<MemoAttachment>,
}

impl Memo {
    /// Creation time, falling back to the legacy unix-seconds field.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.create_time
            .or_else(|| self.created_ts.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }

    /// Parsed visibility, if the server sent a known value.
    pub fn parsed_visibility(&self) -> Option<Visibility> {
        self.visibility.as_deref().and_then(|v| v.parse().ok())
    }

    /// Attachments from either the current or the legacy field.
    pub fn all_attachments(&self) -> impl Iterator<Item = &MemoAttachment> {
        self.attachments.iter().chain(self.resources.iter())
    }

    /// A short single-line preview of the content.
    pub fn preview(&self, max_chars: usize) -> String {
        if self.content.is_empty() {
            return "[No Text]".to_string();
        }
        let flat: String = self.content.replace('\n', " ");
        let mut preview: String = flat.chars().take(max_chars).collect();
        if flat.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}
