//! Terminal summaries printed to stdout once a command finishes.
//!
//! Logs go to stderr; these lines are the only thing written to stdout, so
//! they survive `2>/dev/null`.

use chrono::{DateTime, Utc};
use memos_sync_lib::{CutoffSelection, DeleteSummary, DuplicateSet, Failure, RunSummary};
use owo_colors::OwoColorize;

/// Failures listed individually before the rest are elided.
const MAX_LISTED_FAILURES: usize = 20;

fn rule() {
    println!("{}", "=".repeat(60));
}

fn dry_run_banner(dry_run: bool) {
    if dry_run {
        println!("{}", "DRY RUN: nothing was written".yellow().bold());
    }
}

fn print_failures(failures: &[Failure]) {
    if failures.is_empty() {
        return;
    }
    println!("{}", "Failures:".red().bold());
    for failure in failures.iter().take(MAX_LISTED_FAILURES) {
        println!("  - {}: {}", failure.source_id.bold(), failure.reason);
    }
    if failures.len() > MAX_LISTED_FAILURES {
        println!("  ... and {} more", failures.len() - MAX_LISTED_FAILURES);
    }
}

/// Prints the totals for an `import` or `migrate` run.
pub fn print_run(summary: &RunSummary, dry_run: bool) {
    println!();
    rule();
    dry_run_banner(dry_run);

    let headline = if let Some(reason) = &summary.halted {
        format!("Halted: {reason}").red().bold().to_string()
    } else if summary.cancelled {
        "Cancelled".yellow().bold().to_string()
    } else {
        "Complete".green().bold().to_string()
    };
    println!("{headline}");

    println!(
        "Processed {} of {} fetched: {} succeeded ({} notes, {} comments), {} failed, {} skipped",
        summary.processed,
        summary.fetched,
        summary.succeeded().green(),
        summary.notes_created,
        summary.comments_created,
        summary.failed.red(),
        summary.skipped().yellow(),
    );
    println!(
        "Skipped: {} duplicate, {} filtered",
        summary.skipped_duplicates, summary.skipped_filtered
    );
    if summary.attachments_uploaded + summary.attachments_failed > 0 {
        println!(
            "Attachments: {} uploaded, {} failed",
            summary.attachments_uploaded, summary.attachments_failed
        );
    }
    if summary.backdate_failures > 0 {
        println!(
            "{}",
            format!("{} record(s) kept the server's creation time", summary.backdate_failures).yellow()
        );
    }
    if !summary.fetch_complete {
        println!(
            "{}",
            "Source fetch stopped early; re-run to pick up the rest".yellow()
        );
    }
    print_failures(&summary.failures);
    rule();
}

/// Prints every duplicate set found by `dedupe`.
pub fn print_duplicates(sets: &[DuplicateSet], scanned: usize) {
    let redundant: usize = sets.iter().map(|set| set.remove.len()).sum();
    println!(
        "Scanned {scanned} memo(s): {} duplicate set(s), {} redundant memo(s)",
        sets.len(),
        redundant.bold()
    );
    for set in sets {
        println!(
            "- keep {} {}",
            set.keep.name.green(),
            set.keep.preview(50).dimmed()
        );
        for memo in &set.remove {
            println!("    remove {}", memo.name.red());
        }
    }
}

/// Prints what `prune` is about to delete.
pub fn print_selection(selection: &CutoffSelection, cutoff: DateTime<Utc>) {
    println!(
        "{} memo(s) created before {}",
        selection.selected.len().bold(),
        cutoff.to_rfc3339()
    );
    if selection.undated > 0 {
        println!(
            "{}",
            format!("{} memo(s) have no creation time and are left alone", selection.undated).yellow()
        );
    }
}

pub fn print_nothing_to_delete() {
    println!("{}", "Nothing to delete.".green());
}

/// Prints the totals for a batch delete.
pub fn print_deletes(summary: &DeleteSummary, dry_run: bool) {
    println!();
    rule();
    dry_run_banner(dry_run);
    if let Some(reason) = &summary.halted {
        println!("{}", format!("Halted: {reason}").red().bold());
    } else if summary.cancelled {
        println!("{}", "Cancelled".yellow().bold());
    }
    println!(
        "Deleted {}, failed {}",
        summary.deleted.green(),
        summary.failed.red()
    );
    print_failures(&summary.failures);
    rule();
}
