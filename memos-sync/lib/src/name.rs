//! Parsed resource names.
//!
//! Memos identifies everything by slash-delimited names such as `memos/42`,
//! `memos/42/comments/7` or `attachments/abc`. Names are parsed once, at the
//! boundary where a server hands them out, so later code never slices
//! strings to recover an id.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when a resource name is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name was empty or only whitespace.
    #[error("resource name is empty")]
    Empty,

    /// The name has a segment that is empty or contains whitespace.
    #[error("resource name {0:?} has an empty or invalid segment")]
    InvalidSegment(String),

    /// The name does not match any known collection layout.
    #[error("unrecognized resource name {0:?}")]
    Unrecognized(String),
}

/// A parsed Memos resource name.
///
/// ## Examples
///
/// ```
/// use memos_sync_lib::ResourceName;
///
/// let name: ResourceName = "memos/42/comments/7".parse().unwrap();
/// assert_eq!(name.id(), "7");
/// assert_eq!(name.memo_id(), Some("42"));
/// assert_eq!(name.to_string(), "memos/42/comments/7");
///
/// assert!("memos/".parse::<ResourceName>().is_err());
/// assert!("users/1".parse::<ResourceName>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceName {
    /// A top-level memo: `memos/{id}`.
    Memo {
        /// The memo id.
        id: String,
    },
    /// A comment scoped under a memo: `memos/{memo_id}/comments/{id}`.
    Comment {
        /// The id of the memo the comment belongs to.
        memo_id: String,
        /// The comment id.
        id: String,
    },
    /// An attachment: `attachments/{id}` (legacy servers use `resources/{id}`).
    Attachment {
        /// The attachment id.
        id: String,
    },
}

impl ResourceName {
    /// Builds a memo name from a bare id.
    ///
    /// ## Errors
    ///
    /// Returns an error if the id is empty or contains `/` or whitespace.
    pub fn memo(id: impl Into<String>) -> Result<Self, NameError> {
        let id = id.into();
        validate_segment(&id, &id)?;
        Ok(Self::Memo { id })
    }

    /// Parses a name, rejecting anything that is not a known layout.
    ///
    /// ## Errors
    ///
    /// Returns [`NameError`] for empty, malformed or unknown names.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(NameError::Empty);
        }

        let segments: Vec<&str> = raw.split('/').collect();
        for segment in &segments {
            validate_segment(segment, raw)?;
        }

        match segments.as_slice() {
            ["memos", id] => Ok(Self::Memo { id: id.to_string() }),
            ["memos", memo_id, "comments", id] => Ok(Self::Comment {
                memo_id: memo_id.to_string(),
                id: id.to_string(),
            }),
            ["attachments" | "resources", id] => Ok(Self::Attachment { id: id.to_string() }),
            _ => Err(NameError::Unrecognized(raw.to_string())),
        }
    }

    /// The trailing id segment.
    pub fn id(&self) -> &str {
        match self {
            Self::Memo { id } | Self::Comment { id, .. } | Self::Attachment { id } => id,
        }
    }

    /// The id of the memo this resource lives under, if any.
    pub fn memo_id(&self) -> Option<&str> {
        match self {
            Self::Memo { id } => Some(id),
            Self::Comment { memo_id, .. } => Some(memo_id),
            Self::Attachment { .. } => None,
        }
    }

    /// Returns `true` for top-level memos.
    pub fn is_memo(&self) -> bool {
        matches!(self, Self::Memo { .. })
    }
}

fn validate_segment(segment: &str, raw: &str) -> Result<(), NameError> {
    if segment.is_empty() || segment.contains('/') || segment.chars().any(char::is_whitespace) {
        return Err(NameError::InvalidSegment(raw.to_string()));
    }
    Ok(())
}

impl FromStr for ResourceName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memo { id } => write!(f, "memos/{id}"),
            Self::Comment { memo_id, id } => write!(f, "memos/{memo_id}/comments/{id}"),
            Self::Attachment { id } => write!(f, "attachments/{id}"),
        }
    }
}
