//! Backup orchestration.
//!
//! A run moves through `Preparing -> Enumerating -> Transferring ->
//! Finalizing` and ends in one of `Completed`, `PartiallyFailed`, `Canceled`
//! or `Failed`. Every file goes through path mapping, change detection, an
//! optional streaming copy and a hash of the stored bytes. Per-file errors are
//! reported and skipped; they never stop the run.
//!
//! Canceled runs leave whatever was copied on disk. Re-running the same plan
//! targets the same backup set, where change detection skips every file that
//! was already stored completely.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::change::{detect_change, stat_stored_file, ChangeDecision};
use crate::checksums::hash_file;
use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::fs_ops;
use crate::layout::{backups_root, BackupSet};
use crate::manifest::{machine_name, ManifestBuilder, ManifestStore};
use crate::model::{
    ticks_to_system_time, BackupOutcome, BackupPlan, BackupProgress, FileFailure, FileItem,
    ManifestEntry, RunState,
};
use crate::path_map::map_path;
use crate::progress::ProgressCallback;

struct BackupRun<'a> {
    set: BackupSet,
    options: &'a EngineOptions,
    progress: Option<&'a dyn ProgressCallback>,
    cancel: &'a CancellationToken,
    outcome: BackupOutcome,
    /// Shared by every copy and hash in this run
    buffer: Vec<u8>,
}

impl<'a> BackupRun<'a> {
    fn transition(&mut self, state: RunState) {
        self.outcome.state = state;
        tracing::debug!(%state, "Backup state changed");
        if let Some(callback) = self.progress {
            callback.on_state_changed(state);
        }
    }

    fn report(&self, current: String) {
        if let Some(callback) = self.progress {
            callback.on_progress(&BackupProgress {
                bytes_copied: self.outcome.bytes_copied,
                total_bytes: self.outcome.total_bytes,
                current,
            });
        }
    }

    fn finish(mut self, state: RunState, message: String) -> BackupOutcome {
        self.outcome.message = message;
        self.transition(state);
        match state {
            RunState::Completed | RunState::Canceled => {
                tracing::info!(%state, message = %self.outcome.message, "Backup finished")
            }
            _ => tracing::warn!(%state, message = %self.outcome.message, "Backup finished"),
        }
        self.outcome
    }

    /// Walk every source root and map each file into the data tree.
    fn enumerate(&mut self, plan: &BackupPlan) -> Result<Vec<FileItem>, EngineError> {
        // Never back up our own output when the destination sits inside a source
        let own_output = backups_root(plan.destination_root(), self.options);
        let own_output = std::path::absolute(&own_output).unwrap_or(own_output);
        let mut items = Vec::new();

        for root in plan.sources().paths() {
            self.cancel.check()?;

            let walk = match fs_ops::enumerate_tree(root) {
                Ok(walk) => walk,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "Skipping source root");
                    self.report(format!("Skipped source: {}", e));
                    continue;
                }
            };

            for file in walk {
                self.cancel.check()?;
                if file.path.starts_with(&own_output) {
                    continue;
                }

                match map_path(self.set.data_dir(), root, &file.path) {
                    Ok(mapped) => items.push(FileItem {
                        source_path: file.path,
                        destination_path: mapped.destination_path,
                        relative_path: mapped.relative_path,
                        file_size: file.size,
                        last_modified: file.modified,
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unmappable file");
                    }
                }
            }
        }

        Ok(items)
    }

    /// Store one file and describe it for the manifest.
    ///
    /// Returns `Ok(None)` when no stored copy exists afterwards.
    fn transfer(&mut self, item: &FileItem) -> Result<Option<ManifestEntry>, EngineError> {
        let stored = stat_stored_file(&item.destination_path).map_err(|e| EngineError::ReadError {
            path: item.destination_path.clone(),
            source: e,
        })?;

        match detect_change(item.file_size, item.last_modified, stored) {
            ChangeDecision::CopyNeeded => {
                tracing::debug!(path = %item.source_path.display(), "Copying");
                let modified = ticks_to_system_time(item.last_modified).ok_or_else(|| {
                    EngineError::InvalidTimestamp {
                        path: item.source_path.clone(),
                        ticks: item.last_modified,
                    }
                })?;
                let current = item.source_path.display().to_string();
                let cancel = self.cancel;
                let progress = self.progress;
                let outcome = &mut self.outcome;
                fs_ops::copy_file_streaming(
                    &item.source_path,
                    &item.destination_path,
                    modified,
                    &mut self.buffer,
                    cancel,
                    |chunk| {
                        outcome.bytes_copied += chunk;
                        // A source that grew since enumeration raises the total
                        outcome.total_bytes = outcome.total_bytes.max(outcome.bytes_copied);
                        if let Some(callback) = progress {
                            callback.on_progress(&BackupProgress {
                                bytes_copied: outcome.bytes_copied,
                                total_bytes: outcome.total_bytes,
                                current: current.clone(),
                            });
                        }
                    },
                )?;
                self.outcome.files_copied += 1;
            }
            ChangeDecision::SkipIdentical => {
                tracing::debug!(path = %item.source_path.display(), "Unchanged, skipping copy");
                self.outcome.files_skipped += 1;
                self.report(format!("Skipped: {}", item.source_path.display()));
            }
        }

        if !item.destination_path.is_file() {
            return Ok(None);
        }

        // Size and digest both describe the stored bytes
        let digest = hash_file(&item.destination_path, &mut self.buffer, self.cancel)?;
        Ok(Some(ManifestEntry {
            relative_path: item.relative_path.clone(),
            size_bytes: digest.size,
            last_write_utc_ticks: item.last_modified,
            sha256: digest.sha256,
        }))
    }

    fn record_failure(&mut self, path: &Path, error: &EngineError) {
        tracing::warn!(path = %path.display(), error = %error, "File not backed up");
        self.report(format!("Error: {}: {}", path.display(), error));
        self.outcome.failures.push(FileFailure {
            path: path.to_path_buf(),
            message: error.to_string(),
            error_code: error.raw_os_error(),
        });
    }
}

/// Run a backup plan to completion.
///
/// Never returns an error: every outcome, including failure to start, is
/// described by the returned `BackupOutcome`.
pub fn run_backup(
    plan: &BackupPlan,
    options: &EngineOptions,
    store: &dyn ManifestStore,
    progress: Option<&dyn ProgressCallback>,
    cancel: &CancellationToken,
) -> BackupOutcome {
    let set = BackupSet::for_plan(plan, options);
    let span = tracing::info_span!("backup", run_id = %Uuid::new_v4(), set = %plan.set_name());
    let _guard = span.enter();

    tracing::info!(
        sources = plan.sources().len(),
        destination = %set.root().display(),
        started = %plan.label(),
        "Starting backup"
    );

    let mut run = BackupRun {
        outcome: BackupOutcome::new(set.root().to_path_buf()),
        set,
        options,
        progress,
        cancel,
        buffer: vec![0u8; options.effective_buffer_size()],
    };

    run.transition(RunState::Preparing);
    if let Err(e) = fs::create_dir_all(run.set.root()) {
        let error = EngineError::SetCreationFailed {
            path: run.set.root().to_path_buf(),
            source: e,
        };
        return run.finish(RunState::Failed, error.to_string());
    }

    run.transition(RunState::Enumerating);
    let items = match run.enumerate(plan) {
        Ok(items) => items,
        Err(e) if e.is_cancelled() => return run.finish(RunState::Canceled, "Backup canceled.".to_string()),
        Err(e) => return run.finish(RunState::Failed, format!("Backup failed: {}", e)),
    };
    run.outcome.total_bytes = items.iter().map(|item| item.file_size).sum();
    tracing::info!(files = items.len(), bytes = run.outcome.total_bytes, "Enumeration complete");

    run.transition(RunState::Transferring);
    let mut builder = ManifestBuilder::new(run.options, machine_name()).notes(plan.notes());
    for item in &items {
        if run.cancel.is_cancelled() {
            return run.finish(RunState::Canceled, "Backup canceled.".to_string());
        }

        match run.transfer(item) {
            Ok(Some(entry)) => {
                if let Err(e) = builder.push(entry) {
                    run.record_failure(&item.source_path, &e);
                }
            }
            Ok(None) => {}
            Err(e) if e.is_cancelled() => {
                return run.finish(RunState::Canceled, "Backup canceled.".to_string())
            }
            Err(e) => run.record_failure(&item.source_path, &e),
        }
    }

    run.transition(RunState::Finalizing);
    run.outcome.files_recorded = builder.len();
    let manifest_path: PathBuf = run.set.manifest_path().to_path_buf();
    match store.save(&manifest_path, &builder.build()) {
        Ok(()) => {
            let mut message = format!("Backup complete. {} files saved.", run.outcome.files_recorded);
            if !run.outcome.failures.is_empty() {
                message.push_str(&format!(" {} files failed.", run.outcome.failures.len()));
            }
            run.finish(RunState::Completed, message)
        }
        Err(e) => run.finish(
            RunState::PartiallyFailed,
            format!("Backup data complete but manifest write failed: {}", e),
        ),
    }
}
