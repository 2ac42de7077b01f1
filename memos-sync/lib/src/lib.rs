//! Library for moving posts into a Memos instance and keeping it tidy.
//!
//! This library provides the pieces behind the `memos-sync` CLI: a typed
//! client for the Memos REST API, paginated fetching with bounded retry,
//! content fingerprinting, reply-thread reconstruction and the migration
//! driver that ties them together.
//!
//! ## Core Types
//!
//! - [`SourceRecord`] - A post fetched from a source, before transformation
//! - [`Memo`] - A memo as listed by the Memos API
//! - [`ResourceName`] - Parsed `memos/{id}`, comment and attachment names
//!
//! ## Sources and Destinations
//!
//! - [`RecordSource`] - Where records come from ([`FeedFileSource`], [`MemosSource`])
//! - [`Destination`] - Where notes are written ([`MemosDestination`], [`DryRun`])
//! - [`MemosClient`] - One request per call against a Memos instance
//!
//! ## Reconciliation
//!
//! - [`fingerprint::Fingerprinter`] - Identity hashes, optionally day-bucketed
//! - [`ThreadPlan`] - Roots and replies in write order
//! - [`Migrator`] - Fetch, transform, reconcile, write
//!
//! ## Cleanup
//!
//! - [`find_duplicates`] - Same-content groups, oldest kept
//! - [`select_before`] - Memos older than a cutoff
//! - [`delete_all`] - Paced batch deletion

mod cleanup;
mod client;
pub mod config;
mod destination;
pub mod error;
pub mod fetch;
pub mod fingerprint;
mod migrate;
mod name;
mod progress;
pub mod retry;
mod source;
mod thread;
pub mod transform;
mod types;

pub use cleanup::{CutoffSelection, DeleteSummary, DuplicateSet, delete_all, find_duplicates, select_before};
pub use client::{MemosClient, MemosClientBuilder};
pub use config::{CleanupConfig, Endpoint, ImportConfig, MigrateConfig, Settings};
pub use destination::{Destination, DryRun, MemosDestination};
pub use error::SyncError;
pub use migrate::{
    Failure, IdentifierMap, MigrationOptions, Migrator, ParentTarget, RecordOutcome, RunSummary, SkipReason,
};
pub use name::{NameError, ResourceName};
pub use source::{FeedFileSource, MemosSource, RecordSource};
pub use thread::{MAX_THREAD_DEPTH, RejectReason, Rejected, ThreadPlan};
pub use types::{AttachmentPayload, AttachmentRef, Memo, MemoAttachment, SourceRecord, Visibility};
