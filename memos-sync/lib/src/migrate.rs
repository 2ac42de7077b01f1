//! The migration driver.
//!
//! One run is: index the destination, fetch the source, plan threads, then
//! write roots followed by replies, one record at a time. Per-record failures
//! are counted and the batch moves on; rejected credentials halt the run.
//! Everything already written stays written, and a [`RunSummary`] is always
//! produced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::destination::Destination;
use crate::error::SyncError;
use crate::fingerprint::{Fingerprint, FingerprintIndex, Fingerprinter};
use crate::name::ResourceName;
use crate::progress::Progress;
use crate::source::RecordSource;
use crate::thread::ThreadPlan;
use crate::transform::{ContentTransform, Transformed};
use crate::types::{SourceRecord, Visibility};

/// Knobs for one migration run.
#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    /// Visibility for records that do not carry their own.
    pub default_visibility: Visibility,
    /// Handle filtering/prefixing.
    pub transform: ContentTransform,
    /// How duplicates are recognised.
    pub fingerprinter: Fingerprinter,
    /// The account whose posts are being migrated. Replies to anyone else
    /// become standalone notes.
    pub actor: Option<String>,
    /// Pause after each record that wrote something.
    pub write_delay: Duration,
}

/// Where a reply should be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentTarget {
    /// The note that owns the thread.
    pub note: ResourceName,
    /// The comment to nest under, if the parent was itself a reply.
    pub comment: Option<ResourceName>,
}

/// Source id to destination name mappings for one run.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    roots: HashMap<String, ResourceName>,
    replies: HashMap<String, (ResourceName, ResourceName)>,
    filtered: HashSet<String>,
}

impl IdentifierMap {
    /// Records that `source_id` lives at `note`.
    pub fn insert_root(&mut self, source_id: impl Into<String>, note: ResourceName) {
        self.roots.insert(source_id.into(), note);
    }

    /// Records that `source_id` became `comment` under `note`.
    pub fn insert_reply(&mut self, source_id: impl Into<String>, note: ResourceName, comment: ResourceName) {
        self.replies.insert(source_id.into(), (note, comment));
    }

    /// Records that `source_id` was dropped by the handle filter.
    pub fn mark_filtered(&mut self, source_id: impl Into<String>) {
        self.filtered.insert(source_id.into());
    }

    /// Whether `source_id` was dropped by the handle filter.
    pub fn is_filtered(&self, source_id: &str) -> bool {
        self.filtered.contains(source_id)
    }

    /// Resolves a parent through the root map, then the reply map.
    pub fn resolve(&self, source_id: &str) -> Option<ParentTarget> {
        if let Some(note) = self.roots.get(source_id) {
            return Some(ParentTarget {
                note: note.clone(),
                comment: None,
            });
        }
        self.replies.get(source_id).map(|(note, comment)| ParentTarget {
            note: note.clone(),
            comment: Some(comment.clone()),
        })
    }
}

/// Why a record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Its fingerprint is already at the destination.
    Duplicate,
    /// It (or its thread root) did not pass the handle filter.
    Filtered,
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Written under this name.
    Created(ResourceName),
    /// Deliberately not written.
    Skipped(SkipReason),
    /// Could not be written.
    Failed(String),
}

/// A record that failed, for the final report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Source id.
    pub source_id: String,
    /// What went wrong.
    pub reason: String,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Records returned by the source.
    pub fetched: usize,
    /// Records handled (written, skipped, failed or rejected).
    pub processed: usize,
    /// Notes created.
    pub notes_created: usize,
    /// Comments created.
    pub comments_created: usize,
    /// Records skipped as duplicates.
    pub skipped_duplicates: usize,
    /// Records skipped by the handle filter.
    pub skipped_filtered: usize,
    /// Records that failed or were rejected by thread planning.
    pub failed: usize,
    /// Attachments uploaded.
    pub attachments_uploaded: usize,
    /// Attachments that could not be downloaded or uploaded.
    pub attachments_failed: usize,
    /// Written records whose creation time could not be set.
    pub backdate_failures: usize,
    /// Whether the source fetch ran to the end of its data.
    pub fetch_complete: bool,
    /// Whether the run stopped on a cancellation request.
    pub cancelled: bool,
    /// Why the run halted early, if it did.
    pub halted: Option<String>,
    /// Every failed record.
    pub failures: Vec<Failure>,
}

impl RunSummary {
    /// Notes plus comments created.
    pub fn succeeded(&self) -> usize {
        self.notes_created + self.comments_created
    }

    /// Records skipped for any reason.
    pub fn skipped(&self) -> usize {
        self.skipped_duplicates + self.skipped_filtered
    }

    /// No failures, no early stop and a complete fetch.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
            && self.attachments_failed == 0
            && self.fetch_complete
            && !self.cancelled
            && self.halted.is_none()
    }

    fn record(&mut self, source_id: &str, outcome: &RecordOutcome, is_reply: bool) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Created(_) if is_reply => self.comments_created += 1,
            RecordOutcome::Created(_) => self.notes_created += 1,
            RecordOutcome::Skipped(SkipReason::Duplicate) => self.skipped_duplicates += 1,
            RecordOutcome::Skipped(SkipReason::Filtered) => self.skipped_filtered += 1,
            RecordOutcome::Failed(reason) => self.fail(source_id, reason.clone()),
        }
    }

    fn fail(&mut self, source_id: &str, reason: String) {
        self.failed += 1;
        self.failures.push(Failure {
            source_id: source_id.to_string(),
            reason,
        });
    }
}

/// Runs one migration from `source` into `destination`.
#[derive(Debug)]
pub struct Migrator<'a, S, D> {
    source: &'a S,
    destination: &'a D,
    options: MigrationOptions,
    cancelled: Arc<AtomicBool>,
}

impl<'a, S: RecordSource, D: Destination> Migrator<'a, S, D> {
    /// Creates a driver.
    pub fn new(source: &'a S, destination: &'a D, options: MigrationOptions) -> Self {
        Self {
            source,
            destination,
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares a cancellation flag, checked between records.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Runs the migration.
    ///
    /// Never fails outright: when the destination cannot be indexed or the
    /// source cannot be read, the summary comes back with `halted` set and
    /// nothing written. Failures while writing are reported per record.
    pub async fn run(&self) -> RunSummary {
        let summary = RunSummary::default();

        info!(source = %self.source.describe(), "indexing destination");
        let existing = match self.destination.existing_notes().await {
            Ok(existing) => existing,
            Err(err) => return abort(summary, "indexing destination", err),
        };
        if !existing.is_complete() {
            warn!(stop = ?existing.stop, "destination listing incomplete, duplicates may slip through");
        }
        let notes = FingerprintIndex::from_memos(self.options.fingerprinter, &existing.items);
        info!(notes = existing.items.len(), fingerprints = notes.len(), "destination indexed");

        let fetched = match self.source.records().await {
            Ok(fetched) => fetched,
            Err(err) => return abort(summary, "reading source", err),
        };
        let mut state = RunState {
            summary,
            ids: IdentifierMap::default(),
            notes,
            reused: HashMap::new(),
        };
        state.summary.fetched = fetched.items.len();
        state.summary.fetch_complete = fetched.is_complete();
        if !state.summary.fetch_complete {
            warn!(stop = ?fetched.stop, fetched = state.summary.fetched, "source fetch incomplete");
        }

        let plan = ThreadPlan::build(fetched.items, self.options.actor.as_deref());
        info!(
            roots = plan.roots.len(),
            replies = plan.replies.len(),
            rejected = plan.rejected.len(),
            "thread plan ready"
        );
        for rejected in &plan.rejected {
            warn!(record = %rejected.record.id, reason = %rejected.reason, "record rejected");
            state.summary.processed += 1;
            state.summary.fail(&rejected.record.id, rejected.reason.to_string());
        }

        let mut progress = Progress::new("migration", plan.roots.len() + plan.replies.len());
        let work = plan
            .roots
            .iter()
            .map(|r| (r, false))
            .chain(plan.replies.iter().map(|r| (r, true)));

        for (record, is_reply) in work {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!(processed = state.summary.processed, "cancelled, stopping before next record");
                state.summary.cancelled = true;
                break;
            }

            let outcome = if is_reply {
                self.migrate_reply(record, &mut state).await
            } else {
                self.migrate_root(record, &mut state).await
            };
            match &outcome {
                RecordOutcome::Created(name) => debug!(record = %record.id, %name, "migrated"),
                RecordOutcome::Skipped(reason) => debug!(record = %record.id, ?reason, "skipped"),
                RecordOutcome::Failed(reason) => warn!(record = %record.id, %reason, "failed"),
            }
            state.summary.record(&record.id, &outcome, is_reply);
            progress.tick();

            if let Some(reason) = &state.summary.halted {
                error!(%reason, "halting run");
                break;
            }
            if matches!(outcome, RecordOutcome::Created(_)) && !self.options.write_delay.is_zero() {
                tokio::time::sleep(self.options.write_delay).await;
            }
        }

        let summary = state.summary;
        info!(
            processed = summary.processed,
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            failed = summary.failed,
            "migration finished"
        );
        summary
    }

    async fn migrate_root(&self, record: &SourceRecord, state: &mut RunState) -> RecordOutcome {
        let content = match self.prepare(record) {
            Ok(content) => content,
            Err(outcome) => {
                if outcome == RecordOutcome::Skipped(SkipReason::Filtered) {
                    state.ids.mark_filtered(&record.id);
                }
                return outcome;
            }
        };

        let fingerprint = self.fingerprint(record, &content);
        if let Some(fp) = &fingerprint
            && state.notes.contains(fp)
        {
            if let Some(existing) = state.notes.existing(fp).cloned() {
                state.ids.insert_root(&record.id, existing.clone());
                state.reused.entry(existing).or_insert(None);
            }
            return RecordOutcome::Skipped(SkipReason::Duplicate);
        }

        let visibility = record.visibility.unwrap_or(self.options.default_visibility);
        let note = match self.destination.create_note(&content, visibility).await {
            Ok(note) => note,
            Err(err) => return failure(err, &mut state.summary),
        };
        if let Some(fp) = fingerprint {
            state.notes.insert(fp, Some(note.clone()));
        }
        state.ids.insert_root(&record.id, note.clone());

        self.finish(record, &note, &mut state.summary).await;
        RecordOutcome::Created(note)
    }

    async fn migrate_reply(&self, record: &SourceRecord, state: &mut RunState) -> RecordOutcome {
        let Some(parent_id) = record.parent_id.as_deref() else {
            return RecordOutcome::Failed("reply has no parent".to_string());
        };
        if state.ids.is_filtered(parent_id) {
            state.ids.mark_filtered(&record.id);
            return RecordOutcome::Skipped(SkipReason::Filtered);
        }

        let content = match self.prepare(record) {
            Ok(content) => content,
            Err(outcome) => {
                if outcome == RecordOutcome::Skipped(SkipReason::Filtered) {
                    state.ids.mark_filtered(&record.id);
                }
                return outcome;
            }
        };

        let Some(target) = state.ids.resolve(parent_id) else {
            return RecordOutcome::Failed(format!("parent {parent_id} was not migrated"));
        };

        // Threads under a reused note may already hold this reply from an
        // earlier run.
        let fingerprint = self.fingerprint(record, &content);
        let known = match self.known_comments(&target.note, &mut state.reused).await {
            Ok(known) => known,
            Err(err) => return failure(err, &mut state.summary),
        };
        if let Some(known) = known
            && let Some(fp) = &fingerprint
            && known.contains(fp)
        {
            if let Some(existing) = known.existing(fp).cloned() {
                state.ids.insert_reply(&record.id, target.note, existing);
            }
            return RecordOutcome::Skipped(SkipReason::Duplicate);
        }

        let comment = match self
            .destination
            .create_comment(&target.note, target.comment.as_ref(), &content)
            .await
        {
            Ok(comment) => comment,
            Err(err) => return failure(err, &mut state.summary),
        };
        if let Some(fp) = fingerprint
            && let Some(Some(known)) = state.reused.get_mut(&target.note)
        {
            known.insert(fp, Some(comment.clone()));
        }
        state.ids.insert_reply(&record.id, target.note, comment.clone());

        self.finish(record, &comment, &mut state.summary).await;
        RecordOutcome::Created(comment)
    }

    /// Comment fingerprints under `note` when it is a reused note, listing
    /// them on first use. A non-fatal listing failure leaves the index empty.
    async fn known_comments<'s>(
        &self,
        note: &ResourceName,
        reused: &'s mut HashMap<ResourceName, Option<FingerprintIndex>>,
    ) -> Result<Option<&'s mut FingerprintIndex>, SyncError> {
        let Some(slot) = reused.get_mut(note) else {
            return Ok(None);
        };
        if slot.is_none() {
            let comments = match self.destination.existing_comments(note).await {
                Ok(comments) => comments,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(%note, error = %err, "could not list comments, replies may be duplicated");
                    Vec::new()
                }
            };
            debug!(%note, comments = comments.len(), "indexed existing comments");
            *slot = Some(FingerprintIndex::from_memos(self.options.fingerprinter, &comments));
        }
        Ok(slot.as_mut())
    }

    fn prepare(&self, record: &SourceRecord) -> Result<String, RecordOutcome> {
        match self.options.transform.apply(record) {
            Ok(Transformed::Content(content)) => Ok(content),
            Ok(Transformed::Filtered) => Err(RecordOutcome::Skipped(SkipReason::Filtered)),
            Err(err) => Err(RecordOutcome::Failed(err.to_string())),
        }
    }

    fn fingerprint(&self, record: &SourceRecord, content: &str) -> Option<Fingerprint> {
        let signatures: Vec<String> = record
            .attachments
            .iter()
            .map(|a| {
                format!(
                    "{}:{}",
                    a.filename.as_deref().unwrap_or(&a.url),
                    a.mime_type.as_deref().unwrap_or("unknown")
                )
            })
            .collect();
        self.options
            .fingerprinter
            .fingerprint(content, Some(record.created_at), &signatures)
    }

    /// Backdates a freshly written record and copies its attachments.
    /// Neither step undoes the write when it fails.
    async fn finish(&self, record: &SourceRecord, name: &ResourceName, summary: &mut RunSummary) {
        if let Err(err) = self.destination.backdate(name, record.created_at).await {
            if err.is_fatal() {
                summary.halted = Some(err.to_string());
                return;
            }
            warn!(%name, error = %err, "could not set creation time");
            summary.backdate_failures += 1;
        }

        for download in self.source.attachments(record).await {
            let uploaded = match download {
                Ok(payload) => self.destination.upload_attachment(name, &payload).await,
                Err(err) => Err(err),
            };
            match uploaded {
                Ok(attachment) => {
                    debug!(%name, %attachment, "attachment uploaded");
                    summary.attachments_uploaded += 1;
                }
                Err(err) if err.is_fatal() => {
                    summary.halted = Some(err.to_string());
                    return;
                }
                Err(err) => {
                    warn!(%name, error = %err, "attachment failed");
                    summary.attachments_failed += 1;
                }
            }
        }
    }
}

/// Mutable state of one run.
struct RunState {
    summary: RunSummary,
    ids: IdentifierMap,
    /// Fingerprints of top-level notes, existing and written.
    notes: FingerprintIndex,
    /// Existing notes that skipped roots resolved to, with the fingerprints of
    /// their comments once listed.
    reused: HashMap<ResourceName, Option<FingerprintIndex>>,
}

/// Ends a run that could not start writing.
fn abort(mut summary: RunSummary, stage: &str, err: SyncError) -> RunSummary {
    error!(stage, error = %err, "run aborted before writing");
    summary.halted = Some(format!("{stage}: {err}"));
    summary
}

/// Turns a write error into a record outcome, halting on fatal errors.
fn failure(err: SyncError, summary: &mut RunSummary) -> RecordOutcome {
    if err.is_fatal() {
        summary.halted = Some(err.to_string());
    }
    RecordOutcome::Failed(err.to_string())
}
