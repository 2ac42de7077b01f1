//! memos-sync - move posts into a Memos instance and keep it tidy

mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use memos_sync_lib::config::parse_cutoff;
use memos_sync_lib::error::ConfigError;
use memos_sync_lib::{
    CleanupConfig, DeleteSummary, Destination, DryRun, FeedFileSource, ImportConfig, Memo, MemosSource,
    MigrateConfig, MigrationOptions, Migrator, RecordSource, RunSummary, SyncError, delete_all, find_duplicates,
    select_before,
};
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Move posts into a Memos instance and keep it tidy.
///
/// Connection details come from the environment (a `.env` file in the
/// working directory is loaded first).
///
/// Examples:
///   memos-sync import export.jsonl          # Import a feed export
///   memos-sync migrate --dry-run            # Preview an instance-to-instance copy
///   memos-sync prune --before 2023-01-01    # Delete everything older than 2023
#[derive(Debug, Parser)]
#[command(name = "memos-sync")]
#[command(version)]
#[command(about = "Move posts into a Memos instance and keep it tidy")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Read everything but write nothing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip confirmation prompts for destructive commands
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import a feed export (JSON array or JSON lines) into MEMOS_HOST
    Import {
        /// The export file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Copy every memo from MIGRATION_SOURCE_HOST to MIGRATION_DEST_HOST
    Migrate,

    /// Delete same-day duplicates, keeping the oldest of each set
    Dedupe,

    /// Delete memos created before a cutoff
    Prune {
        /// Cutoff as RFC 3339 or YYYY-MM-DD [default: CUTOFF_DATE]
        #[arg(long, value_name = "DATE", value_parser = parse_cutoff)]
        before: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("confirmation prompt failed: {0}")]
    Prompt(#[from] inquire::InquireError),

    #[error("halted: {0}")]
    Halted(String),

    #[error("cancelled")]
    Cancelled,
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            // Default still shows progress lines
            0 => "warn,memos_sync_lib=info".to_string(),
            1 => "info,memos_sync_lib=debug".to_string(),
            2 => "info,memos_sync_lib=trace".to_string(),
            _ => "debug,memos_sync_lib=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(verbose >= 2)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// First Ctrl-C asks the run to stop after the current record; a second one
/// exits immediately.
fn install_interrupt_handler() -> Arc<AtomicBool> {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if note_interrupt(&flag) {
                std::process::exit(130);
            }
        }
    });
    cancelled
}

/// Marks the run cancelled. Returns `true` when it already was.
fn note_interrupt(cancelled: &AtomicBool) -> bool {
    if cancelled.swap(true, Ordering::SeqCst) {
        warn!("second interrupt, exiting now");
        return true;
    }
    warn!("interrupt received, stopping after the current record (press again to exit now)");
    false
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool, CliError> {
    if assume_yes {
        return Ok(true);
    }
    Ok(inquire::Confirm::new(prompt).with_default(false).prompt()?)
}

async fn migrate_into<S: RecordSource, D: Destination>(
    source: &S,
    destination: &D,
    options: MigrationOptions,
    cancelled: &Arc<AtomicBool>,
) -> RunSummary {
    Migrator::new(source, destination, options)
        .with_cancel_flag(Arc::clone(cancelled))
        .run()
        .await
}

fn finish_run(summary: &RunSummary, dry_run: bool) -> Result<(), CliError> {
    report::print_run(summary, dry_run);
    if let Some(reason) = &summary.halted {
        return Err(CliError::Halted(reason.clone()));
    }
    if summary.cancelled {
        return Err(CliError::Cancelled);
    }
    Ok(())
}

async fn import(cli: &Cli, file: PathBuf, cancelled: &Arc<AtomicBool>) -> Result<(), CliError> {
    let config = ImportConfig::from_env()?;
    let settings = &config.settings;
    let source = FeedFileSource::new(file, config.destination.client()?);
    let destination = settings.destination(&config.destination)?;
    let options = MigrationOptions {
        default_visibility: config.visibility,
        fingerprinter: settings.fingerprinter(),
        actor: config.actor.clone(),
        write_delay: settings.rate_limit_delay,
        ..Default::default()
    };

    let summary = if cli.dry_run {
        migrate_into(&source, &DryRun::new(destination), options, cancelled).await
    } else {
        migrate_into(&source, &destination, options, cancelled).await
    };
    finish_run(&summary, cli.dry_run)
}

async fn migrate(cli: &Cli, cancelled: &Arc<AtomicBool>) -> Result<(), CliError> {
    let config = MigrateConfig::from_env()?;
    let settings = &config.settings;
    let source = MemosSource::new(config.source.client()?, settings.paginator());
    let destination = settings.destination(&config.destination)?;
    let options = MigrationOptions {
        transform: config.transform(),
        fingerprinter: settings.fingerprinter(),
        write_delay: settings.rate_limit_delay,
        ..Default::default()
    };

    let summary = if cli.dry_run {
        migrate_into(&source, &DryRun::new(destination), options, cancelled).await
    } else {
        migrate_into(&source, &destination, options, cancelled).await
    };
    finish_run(&summary, cli.dry_run)
}

/// Lists every memo at the cleanup endpoint. A failed listing still gets a
/// (halted, empty) report.
async fn list_all<D: Destination>(destination: &D, dry_run: bool) -> Result<Vec<Memo>, CliError> {
    let listing = match destination.existing_notes().await {
        Ok(listing) => listing,
        Err(err) => {
            let reason = format!("listing memos: {err}");
            report::print_deletes(
                &DeleteSummary {
                    halted: Some(reason.clone()),
                    ..Default::default()
                },
                dry_run,
            );
            return Err(CliError::Halted(reason));
        }
    };
    if !listing.is_complete() {
        warn!(stop = ?listing.stop, listed = listing.items.len(), "listing incomplete");
    }
    Ok(listing.items)
}

async fn delete_confirmed(
    cli: &Cli,
    config: &CleanupConfig,
    targets: &[Memo],
    prompt: &str,
    cancelled: &Arc<AtomicBool>,
) -> Result<(), CliError> {
    if targets.is_empty() {
        report::print_nothing_to_delete();
        return Ok(());
    }
    if !cli.dry_run && !confirm(prompt, cli.yes)? {
        println!("Aborted, nothing deleted.");
        return Ok(());
    }

    let destination = config.settings.destination(&config.endpoint)?;
    let delay = config.settings.rate_limit_delay;
    let summary: DeleteSummary = if cli.dry_run {
        delete_all(&DryRun::new(destination), targets, delay, cancelled).await
    } else {
        delete_all(&destination, targets, delay, cancelled).await
    };

    report::print_deletes(&summary, cli.dry_run);
    if let Some(reason) = summary.halted {
        return Err(CliError::Halted(reason));
    }
    if summary.cancelled {
        return Err(CliError::Cancelled);
    }
    Ok(())
}

async fn dedupe(cli: &Cli, cancelled: &Arc<AtomicBool>) -> Result<(), CliError> {
    let config = CleanupConfig::from_env()?;
    let destination = config.settings.destination(&config.endpoint)?;
    let memos = list_all(&destination, cli.dry_run).await?;

    let fingerprinter = config.settings.fingerprinter().with_attachments(true);
    let sets = find_duplicates(&memos, fingerprinter);
    report::print_duplicates(&sets, memos.len());

    let targets: Vec<Memo> = sets.into_iter().flat_map(|set| set.remove).collect();
    let prompt = format!("Delete {} duplicate memo(s)?", targets.len());
    delete_confirmed(cli, &config, &targets, &prompt, cancelled).await
}

async fn prune(cli: &Cli, before: Option<DateTime<Utc>>, cancelled: &Arc<AtomicBool>) -> Result<(), CliError> {
    let config = CleanupConfig::from_env()?;
    let cutoff = match before {
        Some(cutoff) => cutoff,
        None => config.require_cutoff()?,
    };
    let destination = config.settings.destination(&config.endpoint)?;
    let memos = list_all(&destination, cli.dry_run).await?;

    let selection = select_before(&memos, cutoff);
    report::print_selection(&selection, cutoff);

    let prompt = format!(
        "Delete {} memo(s) created before {}?",
        selection.selected.len(),
        cutoff.to_rfc3339()
    );
    delete_confirmed(cli, &config, &selection.selected, &prompt, cancelled).await
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let cancelled = install_interrupt_handler();
    match &cli.command {
        Commands::Import { file } => import(&cli, file.clone(), &cancelled).await,
        Commands::Migrate => migrate(&cli, &cancelled).await,
        Commands::Dedupe => dedupe(&cli, &cancelled).await,
        Commands::Prune { before } => prune(&cli, *before, &cancelled).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.json);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(err.exit_code());
    }
}
