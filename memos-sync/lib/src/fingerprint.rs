//! Content fingerprints for duplicate detection.
//!
//! A fingerprint deliberately ignores identifiers: the same post fetched
//! twice, or scraped from a different view, hashes the same. Two modes are
//! supported because the tools disagree on what "duplicate" means:
//!
//! - [`FingerprintMode::Content`] - identical text is a duplicate.
//! - [`FingerprintMode::ContentAndDay`] - identical text on the same UTC
//!   calendar day is a duplicate; recurring boilerplate on different days is
//!   kept.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use xxhash_rust::xxh3::xxh3_64;

use crate::name::ResourceName;
use crate::types::Memo;

/// Which parts of a record make up its identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FingerprintMode {
    /// Text only.
    #[default]
    Content,
    /// Text plus the UTC calendar day of creation.
    ContentAndDay,
}

impl FromStr for FingerprintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(Self::Content),
            "content-day" | "content+day" | "content_day" => Ok(Self::ContentAndDay),
            other => Err(format!(
                "unknown fingerprint mode '{other}', expected 'content' or 'content-day'"
            )),
        }
    }
}

impl fmt::Display for FingerprintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content => f.write_str("content"),
            Self::ContentAndDay => f.write_str("content-day"),
        }
    }
}

/// The date component of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayBucket {
    /// Date is not part of the identity.
    Any,
    /// Created on this UTC day.
    Day(NaiveDate),
    /// Date-bucketed, but the record has no creation time.
    Unknown,
}

/// A fixed-size identity for a record's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    content: u64,
    bucket: DayBucket,
}

impl Fingerprint {
    /// The 64-bit content hash.
    pub fn content_hash(&self) -> u64 {
        self.content
    }

    /// The day bucket.
    pub fn bucket(&self) -> DayBucket {
        self.bucket
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bucket {
            DayBucket::Any => write!(f, "{:016x}", self.content),
            DayBucket::Day(day) => write!(f, "{:016x}_{}", self.content, day.format("%Y-%m-%d")),
            DayBucket::Unknown => write!(f, "{:016x}_unknown", self.content),
        }
    }
}

/// Computes fingerprints under one mode.
///
/// ## Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use memos_sync_lib::fingerprint::{Fingerprinter, FingerprintMode};
///
/// let fp = Fingerprinter::new(FingerprintMode::ContentAndDay);
/// let monday = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
/// let tuesday = Utc.with_ymd_and_hms(2024, 5, 7, 9, 0, 0).unwrap();
///
/// let a = fp.fingerprint("gm", Some(monday), &[]);
/// let b = fp.fingerprint("gm", Some(tuesday), &[]);
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fingerprinter {
    mode: FingerprintMode,
    include_attachments: bool,
}

impl Fingerprinter {
    /// Creates a fingerprinter that hashes text only (plus day, per mode).
    pub fn new(mode: FingerprintMode) -> Self {
        Self {
            mode,
            include_attachments: false,
        }
    }

    /// Also hash the sorted attachment signatures.
    pub fn with_attachments(mut self, include: bool) -> Self {
        self.include_attachments = include;
        self
    }

    /// The configured mode.
    pub fn mode(&self) -> FingerprintMode {
        self.mode
    }

    /// Fingerprints raw parts.
    ///
    /// Returns `None` when there is nothing to identify the record by: empty
    /// text and (if attachments count) no attachments.
    pub fn fingerprint(
        &self,
        text: &str,
        created_at: Option<DateTime<Utc>>,
        attachment_signatures: &[String],
    ) -> Option<Fingerprint> {
        let use_attachments = self.include_attachments && !attachment_signatures.is_empty();
        if text.is_empty() && !use_attachments {
            return None;
        }

        let content = if self.include_attachments {
            let mut signatures = attachment_signatures.to_vec();
            signatures.sort();
            xxh3_64(format!("{text}||{}", signatures.join("|")).as_bytes())
        } else {
            xxh3_64(text.as_bytes())
        };

        let bucket = match self.mode {
            FingerprintMode::Content => DayBucket::Any,
            FingerprintMode::ContentAndDay => created_at
                .map(|t| DayBucket::Day(t.date_naive()))
                .unwrap_or(DayBucket::Unknown),
        };

        Some(Fingerprint { content, bucket })
    }

    /// Fingerprints a memo listed by the API.
    pub fn of_memo(&self, memo: &Memo) -> Option<Fingerprint> {
        let signatures: Vec<String> = memo.all_attachments().map(|a| a.signature()).collect();
        self.fingerprint(&memo.content, memo.created_at(), &signatures)
    }
}

/// Fingerprints already present at the destination.
///
/// Maps each fingerprint to the name of the resource that carries it, when
/// the name is known, so a skipped duplicate can still anchor replies.
#[derive(Debug, Clone, Default)]
pub struct FingerprintIndex {
    fingerprinter: Fingerprinter,
    entries: HashMap<Fingerprint, Option<ResourceName>>,
}

impl FingerprintIndex {
    /// Creates an empty index.
    pub fn new(fingerprinter: Fingerprinter) -> Self {
        Self {
            fingerprinter,
            entries: HashMap::new(),
        }
    }

    /// Builds an index from listed memos. The first memo wins a collision.
    pub fn from_memos<'a>(
        fingerprinter: Fingerprinter,
        memos: impl IntoIterator<Item = &'a Memo>,
    ) -> Self {
        let mut index = Self::new(fingerprinter);
        for memo in memos {
            if let Some(fp) = fingerprinter.of_memo(memo) {
                let name = ResourceName::parse(&memo.name).ok();
                index.entries.entry(fp).or_insert(name);
            }
        }
        index
    }

    /// The fingerprinter used for lookups.
    pub fn fingerprinter(&self) -> Fingerprinter {
        self.fingerprinter
    }

    /// Returns `true` if the fingerprint is already present.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// The existing resource carrying `fingerprint`, if it is known.
    pub fn existing(&self, fingerprint: &Fingerprint) -> Option<&ResourceName> {
        self.entries.get(fingerprint).and_then(Option::as_ref)
    }

    /// Records a newly written resource.
    pub fn insert(&mut self, fingerprint: Fingerprint, name: Option<ResourceName>) {
        self.entries.entry(fingerprint).or_insert(name);
    }

    /// Number of distinct fingerprints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
