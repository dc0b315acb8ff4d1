//! Restore and audit of existing backup sets.
//!
//! Both operations are driven by the manifest: a missing or unreadable
//! manifest aborts immediately, while problems with individual entries are
//! logged and skipped.

use std::path::Path;

use crate::cancel::CancellationToken;
use crate::checksums::{compute_file_checksum, digests_match};
use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::fs_ops;
use crate::layout::BackupSet;
use crate::manifest::ManifestStore;
use crate::model::{ticks_to_system_time, Manifest};
use crate::path_map::manifest_path_to_native;
use crate::progress::RestoreLog;

/// Counts from a restore that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub total: usize,
    pub restored: usize,
    pub failed: usize,
}

/// Result of re-hashing a backup set against its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Entries whose stored bytes match the recorded digest
    pub verified: usize,
    /// Relative paths whose stored bytes no longer match
    pub mismatched: Vec<String>,
    /// Relative paths with no stored file
    pub missing: Vec<String>,
    /// Relative paths that could not be checked, with the reason
    pub errors: Vec<(String, String)>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty() && self.errors.is_empty()
    }
}

fn log(sink: Option<&dyn RestoreLog>, message: &str) {
    tracing::debug!("{}", message);
    if let Some(sink) = sink {
        sink.on_message(message);
    }
}

fn load_manifest(
    set: &BackupSet,
    store: &dyn ManifestStore,
    sink: Option<&dyn RestoreLog>,
) -> Result<Manifest, EngineError> {
    if !set.manifest_path().is_file() {
        log(sink, "Manifest not found.");
        return Err(EngineError::ManifestNotFound {
            path: set.manifest_path().to_path_buf(),
        });
    }
    store.load(set.manifest_path()).map_err(|e| {
        log(sink, &format!("Restore failed: {}", e));
        e
    })
}

/// Copy every file recorded in a backup set's manifest into `target`.
///
/// Each entry is streamed from `data/<relative path>` to
/// `<target>/<relative path>` and stamped with its recorded modification time.
///
/// # Errors
/// Only for a missing or unparsable manifest, or cancellation. A returned
/// report means the restore ran to completion, even if some entries failed.
pub fn restore_backup_set(
    set_path: &Path,
    target: &Path,
    options: &EngineOptions,
    store: &dyn ManifestStore,
    sink: Option<&dyn RestoreLog>,
    cancel: &CancellationToken,
) -> Result<RestoreReport, EngineError> {
    let set = BackupSet::open(set_path, options);
    let manifest = load_manifest(&set, store, sink)?;

    tracing::info!(
        set = %set.root().display(),
        target = %target.display(),
        files = manifest.files.len(),
        "Starting restore"
    );

    let mut buffer = vec![0u8; options.effective_buffer_size()];
    let mut report = RestoreReport {
        total: manifest.files.len(),
        ..RestoreReport::default()
    };

    for entry in &manifest.files {
        if cancel.is_cancelled() {
            log(sink, "Restore canceled.");
            return Err(EngineError::Cancelled);
        }

        let result = manifest_path_to_native(&entry.relative_path).and_then(|native| {
            let modified = ticks_to_system_time(entry.last_write_utc_ticks).ok_or_else(|| {
                EngineError::InvalidTimestamp {
                    path: native.clone(),
                    ticks: entry.last_write_utc_ticks,
                }
            })?;
            fs_ops::copy_file_streaming(
                &set.data_dir().join(&native),
                &target.join(&native),
                modified,
                &mut buffer,
                cancel,
                |_| {},
            )
        });

        match result {
            Ok(_) => {
                report.restored += 1;
                log(sink, &format!("Restored {}", entry.relative_path));
            }
            Err(e) if e.is_cancelled() => {
                log(sink, "Restore canceled.");
                return Err(e);
            }
            Err(e) => {
                report.failed += 1;
                tracing::warn!(path = %entry.relative_path, error = %e, "Entry not restored");
                log(sink, &format!("Restore error: {}: {}", entry.relative_path, e));
            }
        }
    }

    tracing::info!(restored = report.restored, failed = report.failed, "Restore finished");
    log(
        sink,
        &format!("Restore complete. {} of {} files restored.", report.restored, report.total),
    );
    Ok(report)
}

/// Re-hash every stored file and compare it with the manifest.
///
/// # Errors
/// Only for a missing or unparsable manifest, or cancellation.
pub fn verify_backup_set(
    set_path: &Path,
    options: &EngineOptions,
    store: &dyn ManifestStore,
    sink: Option<&dyn RestoreLog>,
    cancel: &CancellationToken,
) -> Result<AuditReport, EngineError> {
    let set = BackupSet::open(set_path, options);
    let manifest = load_manifest(&set, store, sink)?;
    let mut buffer = vec![0u8; options.effective_buffer_size()];
    let mut report = AuditReport::default();

    for entry in &manifest.files {
        cancel.check()?;

        let native = match manifest_path_to_native(&entry.relative_path) {
            Ok(native) => native,
            Err(e) => {
                log(sink, &format!("Invalid entry: {}: {}", entry.relative_path, e));
                report.errors.push((entry.relative_path.clone(), e.to_string()));
                continue;
            }
        };

        let stored = set.data_dir().join(native);
        if !stored.is_file() {
            log(sink, &format!("Missing: {}", entry.relative_path));
            report.missing.push(entry.relative_path.clone());
            continue;
        }

        match compute_file_checksum(&stored, &mut buffer, cancel) {
            Ok(actual) if digests_match(&entry.sha256, &actual) => report.verified += 1,
            Ok(_) => {
                log(sink, &format!("Mismatch: {}", entry.relative_path));
                report.mismatched.push(entry.relative_path.clone());
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                log(sink, &format!("Unreadable: {}: {}", entry.relative_path, e));
                report.errors.push((entry.relative_path.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        verified = report.verified,
        mismatched = report.mismatched.len(),
        missing = report.missing.len(),
        "Audit finished"
    );
    Ok(report)
}
