//! Duplicate cleanup and pruning of old notes.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::destination::Destination;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::migrate::Failure;
use crate::name::ResourceName;
use crate::progress::Progress;
use crate::types::Memo;

/// Memos sharing one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    /// The shared fingerprint.
    pub fingerprint: Fingerprint,
    /// The oldest memo, which is kept.
    pub keep: Memo,
    /// Every other memo in the set, oldest first.
    pub remove: Vec<Memo>,
}

/// Oldest first; memos without a creation time sort last, ties by name.
fn by_age(a: &Memo, b: &Memo) -> CmpOrdering {
    match (a.created_at(), b.created_at()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
    .then_with(|| a.name.cmp(&b.name))
}

/// Groups `memos` by fingerprint and returns every group with more than one
/// member. Memos with nothing to fingerprint are never considered duplicates.
///
/// Sets are ordered by the kept memo's age.
pub fn find_duplicates(memos: &[Memo], fingerprinter: Fingerprinter) -> Vec<DuplicateSet> {
    let mut groups: HashMap<Fingerprint, Vec<&Memo>> = HashMap::new();
    for memo in memos {
        if let Some(fp) = fingerprinter.of_memo(memo) {
            groups.entry(fp).or_default().push(memo);
        }
    }

    let mut sets: Vec<DuplicateSet> = groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(fingerprint, mut group)| {
            group.sort_by(|a, b| by_age(a, b));
            let mut group = group.into_iter().cloned();
            let keep = group.next().unwrap_or_default();
            DuplicateSet {
                fingerprint,
                keep,
                remove: group.collect(),
            }
        })
        .collect();
    sets.sort_by(|a, b| by_age(&a.keep, &b.keep));
    sets
}

/// Memos chosen for pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CutoffSelection {
    /// Memos created strictly before the cutoff, oldest first.
    pub selected: Vec<Memo>,
    /// Memos with no creation time, left alone.
    pub undated: usize,
}

/// Selects memos created strictly before `cutoff`.
pub fn select_before(memos: &[Memo], cutoff: DateTime<Utc>) -> CutoffSelection {
    let mut selection = CutoffSelection::default();
    for memo in memos {
        match memo.created_at() {
            Some(created) if created < cutoff => selection.selected.push(memo.clone()),
            Some(_) => {}
            None => selection.undated += 1,
        }
    }
    selection.selected.sort_by(by_age);
    selection
}

/// Totals for a batch delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    /// Names deleted.
    pub deleted: usize,
    /// Names that could not be deleted.
    pub failed: usize,
    /// Per-name failures.
    pub failures: Vec<Failure>,
    /// Stopped on a cancellation request.
    pub cancelled: bool,
    /// Stopped on rejected credentials.
    pub halted: Option<String>,
}

/// Deletes `memos` one at a time, pausing `delay` between deletions.
///
/// Failures are counted and the batch continues; rejected credentials stop
/// it.
pub async fn delete_all<D: Destination>(
    destination: &D,
    memos: &[Memo],
    delay: Duration,
    cancelled: &Arc<AtomicBool>,
) -> DeleteSummary {
    let mut summary = DeleteSummary::default();
    let mut progress = Progress::new("delete", memos.len());

    for (i, memo) in memos.iter().enumerate() {
        if cancelled.load(Ordering::SeqCst) {
            warn!(deleted = summary.deleted, "cancelled, stopping deletes");
            summary.cancelled = true;
            break;
        }
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match ResourceName::parse(&memo.name) {
            Ok(name) => destination.delete(&name).await,
            Err(err) => Err(err.into()),
        };
        progress.tick();

        match result {
            Ok(()) => {
                info!(name = %memo.name, preview = %memo.preview(50), "deleted");
                summary.deleted += 1;
            }
            Err(err) => {
                summary.failed += 1;
                summary.failures.push(Failure {
                    source_id: memo.name.clone(),
                    reason: err.to_string(),
                });
                if err.is_fatal() {
                    error!(error = %err, "halting deletes");
                    summary.halted = Some(err.to_string());
                    break;
                }
                warn!(name = %memo.name, error = %err, "delete failed");
            }
        }
    }
    summary
}
