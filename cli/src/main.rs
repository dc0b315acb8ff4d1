//! WinSwitch - Command-line front end for the backup engine.
//!
//! Backs up folders to a removable drive, restores a backup set, audits a set
//! against its manifest, and lists the sets on a drive.

mod logging;
mod progress;
mod signal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use engine::{
    list_backup_sets, spawn_backup, spawn_restore, verify_backup_set, BackupOutcome, BackupPlan,
    CancellationToken, EngineError, EngineOptions, JsonManifestStore, ManifestStore, RunState,
    SourceSelection, WorkerHandle,
};

use crate::progress::CliProgress;

const EXIT_OK: i32 = 0;
const EXIT_PARTIAL: i32 = 1;
const EXIT_FAILED: i32 = 2;
const EXIT_CANCELED: i32 = 130;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// WinSwitch - incremental folder backups to a removable drive
#[derive(Parser, Debug)]
#[command(name = "winswitch")]
#[command(version)]
#[command(about = "Back up and restore folders with a SHA-256 manifest")]
struct Cli {
    /// Log filter (e.g. warn, info, engine=debug). RUST_LOG takes precedence.
    #[arg(long, global = true, env = "WINSWITCH_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy new and changed files into a backup set
    Backup(BackupArgs),
    /// Copy every file of a backup set into a target folder
    Restore(RestoreArgs),
    /// Re-hash a backup set and compare it with its manifest
    Verify(VerifyArgs),
    /// List backup sets on a destination drive
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
struct BackupArgs {
    /// Folder to back up (repeatable)
    #[arg(long = "source", value_name = "PATH", required = true)]
    sources: Vec<PathBuf>,

    /// Destination drive or folder
    #[arg(long, value_name = "PATH", env = "WINSWITCH_DEST")]
    dest: PathBuf,

    /// Continue an existing backup set (yyyyMMdd_HHmmss) instead of starting a new one
    #[arg(long, value_name = "SET")]
    resume: Option<String>,

    /// Free-form note stored in the manifest
    #[arg(long)]
    notes: Option<String>,

    /// Copy buffer size in bytes
    #[arg(long, value_name = "BYTES", env = "WINSWITCH_BUFFER_SIZE")]
    buffer_size: Option<usize>,

    /// Print every state change and skipped file
    #[arg(long)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct RestoreArgs {
    /// Backup set directory (the one holding manifest.json)
    #[arg(long = "set", value_name = "PATH")]
    set_path: PathBuf,

    /// Folder to restore into
    #[arg(long, value_name = "PATH")]
    target: PathBuf,

    /// Print every restored file
    #[arg(long)]
    verbose: bool,
}

#[derive(clap::Args, Debug)]
struct VerifyArgs {
    /// Backup set directory (the one holding manifest.json)
    #[arg(long = "set", value_name = "PATH")]
    set_path: PathBuf,
}

#[derive(clap::Args, Debug)]
struct ListArgs {
    /// Destination drive or folder
    #[arg(long, value_name = "PATH", env = "WINSWITCH_DEST")]
    dest: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level) {
        eprintln!("Warning: logging disabled: {}", e);
    }
    signal::install_handlers();

    let exit_code = match run_cli(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILED
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(cli: &Cli) -> anyhow::Result<i32> {
    match &cli.command {
        Command::Backup(args) => run_backup_command(args),
        Command::Restore(args) => run_restore_command(args),
        Command::Verify(args) => run_verify_command(args),
        Command::List(args) => run_list_command(args),
    }
}

fn options_with_buffer(buffer_size: Option<usize>) -> anyhow::Result<EngineOptions> {
    let mut options = EngineOptions::default();
    if let Some(size) = buffer_size {
        if size == 0 {
            bail!("Buffer size must be greater than zero");
        }
        options.buffer_size = size;
    }
    Ok(options)
}

/// Pump worker events into the renderer until the worker hangs up, turning
/// Ctrl+C into a cancellation request.
fn drive<T>(handle: &WorkerHandle<T>, renderer: &mut CliProgress) {
    loop {
        if signal::shutdown_requested() && !handle.cancel_token().is_cancelled() {
            tracing::info!("Interrupt received, canceling");
            handle.cancel();
        }
        match handle.events().recv_timeout(POLL_INTERVAL) {
            Ok(event) => renderer.handle(&event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn backup_exit_code(outcome: &BackupOutcome) -> i32 {
    match outcome.state {
        RunState::Completed if outcome.failures.is_empty() => EXIT_OK,
        RunState::Completed | RunState::PartiallyFailed => EXIT_PARTIAL,
        RunState::Canceled => EXIT_CANCELED,
        _ => EXIT_FAILED,
    }
}

fn run_backup_command(args: &BackupArgs) -> anyhow::Result<i32> {
    let options = options_with_buffer(args.buffer_size)?;

    let sources = SourceSelection::resolve(&args.sources);
    if sources.is_empty() {
        bail!("None of the given source folders exist");
    }
    if sources.len() < args.sources.len() {
        eprintln!(
            "Warning: {} source folder(s) skipped (missing or not a directory)",
            args.sources.len() - sources.len()
        );
    }

    let mut plan = match &args.resume {
        Some(set_name) => BackupPlan::resume(sources, &args.dest, set_name.as_str()),
        None => BackupPlan::new(sources, &args.dest),
    };
    if let Some(notes) = &args.notes {
        plan = plan.with_notes(notes.as_str());
    }

    eprintln!("Backing up {} folder(s) to {}", plan.sources().len(), args.dest.display());
    eprintln!("  Set: {} ({})", plan.set_name(), plan.label());

    let handle = spawn_backup(plan, options, Arc::new(JsonManifestStore));
    let mut renderer = CliProgress::new(args.verbose);
    drive(&handle, &mut renderer);
    let outcome = handle.join()?;
    renderer.finish_backup(&outcome);

    Ok(backup_exit_code(&outcome))
}

fn run_restore_command(args: &RestoreArgs) -> anyhow::Result<i32> {
    if !args.set_path.is_dir() {
        bail!("Backup set not found: {}", args.set_path.display());
    }

    let handle = spawn_restore(
        args.set_path.clone(),
        args.target.clone(),
        EngineOptions::default(),
        Arc::new(JsonManifestStore),
    );
    let mut renderer = CliProgress::new(args.verbose);
    drive(&handle, &mut renderer);

    match handle.join()? {
        Ok(report) if report.failed == 0 => Ok(EXIT_OK),
        Ok(_) => Ok(EXIT_PARTIAL),
        Err(EngineError::Cancelled) => Ok(EXIT_CANCELED),
        Err(e) => Err(e).context("Restore failed"),
    }
}

fn run_verify_command(args: &VerifyArgs) -> anyhow::Result<i32> {
    let options = EngineOptions::default();
    let cancel = CancellationToken::new();
    let store = JsonManifestStore;

    let result = thread::scope(|s| {
        let worker = s.spawn(|| verify_backup_set(&args.set_path, &options, &store, None, &cancel));
        while !worker.is_finished() {
            if signal::shutdown_requested() {
                cancel.cancel();
            }
            thread::sleep(POLL_INTERVAL);
        }
        worker.join()
    });
    let result = result.map_err(|_| anyhow::anyhow!("Audit thread panicked"))?;

    let report = match result {
        Ok(report) => report,
        Err(EngineError::Cancelled) => return Ok(EXIT_CANCELED),
        Err(e) => return Err(e).context("Audit failed"),
    };

    for path in &report.mismatched {
        eprintln!("MISMATCH  {}", path);
    }
    for path in &report.missing {
        eprintln!("MISSING   {}", path);
    }
    for (path, reason) in &report.errors {
        eprintln!("ERROR     {}: {}", path, reason);
    }
    eprintln!(
        "Verified: {} OK, {} mismatch, {} missing, {} unreadable",
        report.verified,
        report.mismatched.len(),
        report.missing.len(),
        report.errors.len()
    );

    Ok(if report.is_clean() { EXIT_OK } else { EXIT_PARTIAL })
}

/// Render a manifest `CreatedAt` stamp in local time, or verbatim if it does
/// not parse.
fn format_created_at(created_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(created_at)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| created_at.to_string())
}

fn describe_set(path: &Path, store: &dyn ManifestStore, options: &EngineOptions) -> String {
    match store.load(&path.join(&options.manifest_file)) {
        Ok(manifest) => {
            let bytes: u64 = manifest.files.iter().map(|f| f.size_bytes).sum();
            let mut line = format!(
                "{} files, {}, created {} on {}",
                manifest.files.len(),
                CliProgress::format_bytes(bytes),
                format_created_at(&manifest.created_at),
                manifest.machine_name
            );
            if let Some(notes) = manifest.notes {
                line.push_str(&format!(" ({})", notes));
            }
            line
        }
        Err(e) => format!("unreadable manifest: {}", e),
    }
}

fn run_list_command(args: &ListArgs) -> anyhow::Result<i32> {
    let options = EngineOptions::default();
    let sets = list_backup_sets(&args.dest, &options)?;
    if sets.is_empty() {
        println!("No backup sets on {}", args.dest.display());
        return Ok(EXIT_OK);
    }

    for set in &sets {
        let detail = if set.has_manifest {
            describe_set(&set.path, &JsonManifestStore, &options)
        } else {
            "incomplete (no manifest)".to_string()
        };
        println!("{}  {}", set.name, detail);
    }
    Ok(EXIT_OK)
}
