//! Turning a source record into note content.

use thiserror::Error;

use crate::types::SourceRecord;

/// Errors that make a single record unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The record has no text and no attachments.
    #[error("record {id} has no content and no attachments")]
    Empty {
        /// Source id of the record.
        id: String,
    },
}

/// Result of transforming one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// Content to write.
    Content(String),
    /// The record does not pass the handle filter.
    Filtered,
}

/// Handle-based rewriting applied before fingerprinting and writing.
///
/// - `filter_handle`: keep only content starting with `@{handle}:` and strip
///   that prefix. Takes precedence over `prefix_handle`.
/// - `prefix_handle`: prepend `@{handle}:\n` to the content.
///
/// ## Examples
///
/// ```
/// use chrono::Utc;
/// use memos_sync_lib::SourceRecord;
/// use memos_sync_lib::transform::{ContentTransform, Transformed};
///
/// let transform = ContentTransform::default().with_prefix_handle("alice");
/// let record = SourceRecord::new("1", "hi", Utc::now());
/// assert_eq!(
///     transform.apply(&record).unwrap(),
///     Transformed::Content("@alice:\nhi".to_string())
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTransform {
    prefix_handle: Option<String>,
    filter_handle: Option<String>,
}

impl ContentTransform {
    /// Prepends `@{handle}:` to every migrated record.
    pub fn with_prefix_handle(mut self, handle: impl Into<String>) -> Self {
        self.prefix_handle = Some(handle.into()).filter(|h: &String| !h.is_empty());
        self
    }

    /// Only migrates records written as `@{handle}: ...`.
    pub fn with_filter_handle(mut self, handle: impl Into<String>) -> Self {
        self.filter_handle = Some(handle.into()).filter(|h: &String| !h.is_empty());
        self
    }

    /// Applies the transform to one record.
    ///
    /// ## Errors
    ///
    /// Returns [`TransformError::Empty`] for records with neither text nor
    /// attachments.
    pub fn apply(&self, record: &SourceRecord) -> Result<Transformed, TransformError> {
        if record.text.trim().is_empty() && record.attachments.is_empty() {
            return Err(TransformError::Empty {
                id: record.id.clone(),
            });
        }

        if let Some(handle) = &self.filter_handle {
            let prefix = format!("@{handle}:");
            return Ok(match record.text.trim_start().strip_prefix(&prefix) {
                Some(rest) => Transformed::Content(rest.trim().to_string()),
                None => Transformed::Filtered,
            });
        }

        if let Some(handle) = &self.prefix_handle {
            return Ok(Transformed::Content(format!("@{handle}:\n{}", record.text)));
        }

        Ok(Transformed::Content(record.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttachmentRef;
    use chrono::Utc;

    fn record(text: &str) -> SourceRecord {
        SourceRecord::new("r1", text, Utc::now())
    }

    #[test]
    fn passes_text_through_by_default() {
        let out = ContentTransform::default().apply(&record("plain")).unwrap();
        assert_eq!(out, Transformed::Content("plain".to_string()));
    }

    #[test]
    fn empty_record_is_an_error() {
        let err = ContentTransform::default().apply(&record("  ")).unwrap_err();
        assert_eq!(err, TransformError::Empty { id: "r1".to_string() });
    }

    #[test]
    fn attachment_only_record_is_kept() {
        let r = record("").with_attachment(AttachmentRef::new("https://cdn/x.jpg"));
        let out = ContentTransform::default().apply(&r).unwrap();
        assert_eq!(out, Transformed::Content(String::new()));
    }

    #[test]
    fn filter_strips_matching_prefix() {
        let t = ContentTransform::default().with_filter_handle("bob");
        let out = t.apply(&record("  @bob:\n  the text ")).unwrap();
        assert_eq!(out, Transformed::Content("the text".to_string()));
    }

    #[test]
    fn filter_skips_other_content() {
        let t = ContentTransform::default().with_filter_handle("bob");
        assert_eq!(t.apply(&record("@carol: hi")).unwrap(), Transformed::Filtered);
    }

    #[test]
    fn filter_takes_precedence_over_prefix() {
        let t = ContentTransform::default()
            .with_prefix_handle("alice")
            .with_filter_handle("bob");
        let out = t.apply(&record("@bob: hi")).unwrap();
        assert_eq!(out, Transformed::Content("hi".to_string()));
    }

    #[test]
    fn empty_handles_are_ignored() {
        let t = ContentTransform::default()
            .with_prefix_handle("")
            .with_filter_handle("");
        assert_eq!(t, ContentTransform::default());
    }
}
