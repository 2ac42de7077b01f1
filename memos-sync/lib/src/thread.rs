//! Reply-thread reconstruction.
//!
//! Splits a fetched record set into roots and replies, and orders both so a
//! reply is always written after its parent. Ordering trusts source
//! timestamps: replies sort by `(created_at, depth, id)`, so equal timestamps
//! still put a parent (smaller depth) first. A reply that claims to predate
//! its own parent is rejected instead of being guessed into place, and
//! parent chains are walked with a visited set so malformed cycles cannot
//! loop.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::SourceRecord;

/// Longest parent chain accepted before a reply is rejected.
pub const MAX_THREAD_DEPTH: usize = 1024;

/// Why a record was left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another record with the same id came first.
    DuplicateId,
    /// The reply is timestamped before its parent.
    OutOfOrder {
        /// Source id of the parent.
        parent_id: String,
    },
    /// The parent chain loops back on itself.
    Cycle,
    /// The parent chain is longer than [`MAX_THREAD_DEPTH`].
    TooDeep,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId => f.write_str("duplicate source id"),
            Self::OutOfOrder { parent_id } => {
                write!(f, "reply is older than its parent {parent_id}")
            }
            Self::Cycle => f.write_str("parent chain contains a cycle"),
            Self::TooDeep => write!(f, "parent chain deeper than {MAX_THREAD_DEPTH}"),
        }
    }
}

/// A record excluded from the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// The record.
    pub record: SourceRecord,
    /// Why it was excluded.
    pub reason: RejectReason,
}

/// Roots and replies in write order, plus rejected records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPlan {
    /// Records written as notes, oldest first.
    pub roots: Vec<SourceRecord>,
    /// Records written as comments, parents before children.
    pub replies: Vec<SourceRecord>,
    /// Records excluded from reconstruction.
    pub rejected: Vec<Rejected>,
}

impl ThreadPlan {
    /// Builds a plan for records fetched on behalf of `actor`.
    ///
    /// A record is a root when it has no parent, or when `actor` is known and
    /// the record's `parent_author` is someone else. Every other record with a
    /// parent is a reply, including replies whose parent is missing from the
    /// set; those stay in the plan and fail when their parent cannot be
    /// resolved at write time.
    ///
    /// ## Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use memos_sync_lib::{SourceRecord, ThreadPlan};
    ///
    /// let t = |s| Utc.timestamp_opt(s, 0).unwrap();
    /// let plan = ThreadPlan::build(
    ///     vec![
    ///         SourceRecord::new("c", "third", t(3)).with_parent("b"),
    ///         SourceRecord::new("a", "first", t(1)),
    ///         SourceRecord::new("b", "second", t(2)).with_parent("a"),
    ///     ],
    ///     None,
    /// );
    /// assert_eq!(plan.roots[0].id, "a");
    /// let reply_ids: Vec<_> = plan.replies.iter().map(|r| r.id.as_str()).collect();
    /// assert_eq!(reply_ids, ["b", "c"]);
    /// ```
    pub fn build(records: Vec<SourceRecord>, actor: Option<&str>) -> Self {
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(records.len());
        for mut record in records {
            if record.parent_id.as_deref().is_some_and(str::is_empty) {
                record.parent_id = None;
            }
            if seen.insert(record.id.clone()) {
                unique.push(record);
            } else {
                rejected.push(Rejected {
                    record,
                    reason: RejectReason::DuplicateId,
                });
            }
        }

        let index: HashMap<&str, usize> = unique
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let replies: Vec<bool> = unique.iter().map(|r| is_reply(r, actor)).collect();
        let depths = reply_depths(&unique, &index, &replies);

        let mut roots = Vec::new();
        let mut ordered_replies = Vec::new();
        let mut excluded = Vec::new();
        for (i, record) in unique.iter().enumerate() {
            if !replies[i] {
                roots.push(i);
                continue;
            }
            match &depths[i] {
                Some(Ok(depth)) => {
                    let parent = record
                        .parent_id
                        .as_deref()
                        .and_then(|p| index.get(p))
                        .map(|&p| &unique[p]);
                    match parent {
                        Some(parent) if parent.created_at > record.created_at => {
                            excluded.push((
                                i,
                                RejectReason::OutOfOrder {
                                    parent_id: parent.id.clone(),
                                },
                            ));
                        }
                        _ => ordered_replies.push((i, *depth)),
                    }
                }
                Some(Err(reason)) => excluded.push((i, reason.clone())),
                None => ordered_replies.push((i, 1)),
            }
        }

        roots.sort_by(|&a, &b| {
            (unique[a].created_at, &unique[a].id).cmp(&(unique[b].created_at, &unique[b].id))
        });
        ordered_replies.sort_by(|&(a, da), &(b, db)| {
            (unique[a].created_at, da, &unique[a].id).cmp(&(unique[b].created_at, db, &unique[b].id))
        });

        let mut slots: Vec<Option<SourceRecord>> = unique.into_iter().map(Some).collect();
        let mut take = |i: usize| {
            slots[i]
                .take()
                .unwrap_or_else(|| unreachable!("record {i} placed twice"))
        };

        let roots = roots.into_iter().map(&mut take).collect();
        let replies = ordered_replies.into_iter().map(|(i, _)| take(i)).collect();
        for (i, reason) in excluded {
            rejected.push(Rejected {
                record: take(i),
                reason,
            });
        }

        Self {
            roots,
            replies,
            rejected,
        }
    }

    /// Total number of records the plan accounts for.
    pub fn len(&self) -> usize {
        self.roots.len() + self.replies.len() + self.rejected.len()
    }

    /// Returns `true` if the plan holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn is_reply(record: &SourceRecord, actor: Option<&str>) -> bool {
    if record.parent_id.is_none() {
        return false;
    }
    match (actor, record.parent_author.as_deref()) {
        (Some(actor), Some(parent_author)) => actor == parent_author,
        _ => true,
    }
}

/// Depth of every reply: 1 for a reply to a root or to a record outside the
/// set, parent depth + 1 otherwise. Roots are `None`.
fn reply_depths(
    records: &[SourceRecord],
    index: &HashMap<&str, usize>,
    replies: &[bool],
) -> Vec<Option<Result<usize, RejectReason>>> {
    let mut depth: Vec<Option<Result<usize, RejectReason>>> = vec![None; records.len()];

    for start in 0..records.len() {
        if !replies[start] || depth[start].is_some() {
            continue;
        }

        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut current = start;
        let mut walk_too_long = false;
        let base = loop {
            if let Some(known) = &depth[current] {
                break known.clone();
            }
            if !replies[current] {
                break Ok(0);
            }
            if !on_path.insert(current) {
                break Err(RejectReason::Cycle);
            }
            path.push(current);
            if path.len() > MAX_THREAD_DEPTH {
                walk_too_long = true;
                break Err(RejectReason::TooDeep);
            }
            match records[current]
                .parent_id
                .as_deref()
                .and_then(|p| index.get(p))
            {
                Some(&parent) => current = parent,
                None => break Ok(0),
            }
        };

        match base {
            Ok(base) => {
                for (k, &node) in path.iter().rev().enumerate() {
                    let d = base + k + 1;
                    depth[node] = Some(if d > MAX_THREAD_DEPTH {
                        Err(RejectReason::TooDeep)
                    } else {
                        Ok(d)
                    });
                }
            }
            // Ancestors on an over-long walk may still be shallow enough;
            // they get their own walk.
            Err(_) if walk_too_long => depth[start] = Some(Err(RejectReason::TooDeep)),
            Err(reason) => {
                for &node in &path {
                    depth[node] = Some(Err(reason.clone()));
                }
            }
        }
    }

    depth
}
