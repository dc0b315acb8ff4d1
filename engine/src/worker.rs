//! Background execution.
//!
//! Runs a backup or restore on its own thread and streams every progress
//! event back over a crossbeam channel, so a front end can keep rendering
//! while the engine works.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver};

use crate::cancel::CancellationToken;
use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::job::run_backup;
use crate::manifest::ManifestStore;
use crate::model::{BackupOutcome, BackupPlan};
use crate::progress::{ChannelProgress, ProgressEvent};
use crate::restore::{restore_backup_set, RestoreReport};

/// A running operation on a worker thread.
pub struct WorkerHandle<T> {
    events: Receiver<ProgressEvent>,
    cancel: CancellationToken,
    thread: JoinHandle<T>,
}

impl<T> WorkerHandle<T> {
    /// Events in emission order. Disconnects once the worker finishes.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Ask the worker to stop at its next chunk or file boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the worker and take its result.
    ///
    /// # Errors
    /// `Unknown` if the worker thread panicked.
    pub fn join(self) -> Result<T, EngineError> {
        self.thread.join().map_err(|_| EngineError::Unknown {
            message: "worker thread panicked".to_string(),
        })
    }
}

pub type BackupHandle = WorkerHandle<BackupOutcome>;
pub type RestoreHandle = WorkerHandle<Result<RestoreReport, EngineError>>;

/// Start a backup on a new thread.
pub fn spawn_backup(
    plan: BackupPlan,
    options: EngineOptions,
    store: Arc<dyn ManifestStore>,
) -> BackupHandle {
    let (tx, rx) = unbounded();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();

    let thread = thread::spawn(move || {
        let progress = ChannelProgress::new(tx);
        run_backup(&plan, &options, store.as_ref(), Some(&progress), &worker_cancel)
    });

    WorkerHandle {
        events: rx,
        cancel,
        thread,
    }
}

/// Start a restore on a new thread. Status lines arrive as `ProgressEvent::Log`.
pub fn spawn_restore(
    set_path: PathBuf,
    target: PathBuf,
    options: EngineOptions,
    store: Arc<dyn ManifestStore>,
) -> RestoreHandle {
    let (tx, rx) = unbounded();
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();

    let thread = thread::spawn(move || {
        let log = ChannelProgress::new(tx);
        restore_backup_set(
            &set_path,
            &target,
            &options,
            store.as_ref(),
            Some(&log),
            &worker_cancel,
        )
    });

    WorkerHandle {
        events: rx,
        cancel,
        thread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::JsonManifestStore;
    use crate::model::{RunState, SourceSelection};
    use chrono::{Local, TimeZone};
    use std::fs;

    fn plan_for(base: &std::path::Path) -> BackupPlan {
        let src = base.join("src");
        fs::create_dir_all(src.join("sub")).expect("Failed to create source");
        fs::write(src.join("a.txt"), b"0123456789").expect("Failed to write");
        fs::write(src.join("sub").join("b.txt"), b"abcdefghij").expect("Failed to write");
        let when = Local.with_ymd_and_hms(2025, 9, 2, 9, 15, 22).unwrap();
        BackupPlan::at(SourceSelection::resolve([&src]), base.join("usb"), when)
    }

    #[test]
    fn test_spawn_backup_streams_events() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let handle = spawn_backup(
            plan_for(temp_dir.path()),
            EngineOptions::default(),
            Arc::new(JsonManifestStore),
        );

        let events: Vec<ProgressEvent> = handle.events().iter().collect();
        let outcome = handle.join().expect("worker should not panic");

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.bytes_copied, 20);
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::StateChanged(RunState::Preparing))
        );
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::StateChanged(RunState::Completed))
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Progress(p) if p.bytes_copied == 20)));
    }

    #[test]
    fn test_spawn_backup_cancel_from_handle() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let plan = plan_for(temp_dir.path());
        fs::write(temp_dir.path().join("src").join("big.bin"), vec![7u8; 4 * 1024 * 1024])
            .expect("Failed to write");

        let options = EngineOptions {
            buffer_size: 64,
            ..EngineOptions::default()
        };
        let handle = spawn_backup(plan, options, Arc::new(JsonManifestStore));

        for event in handle.events().iter() {
            if matches!(event, ProgressEvent::Progress(ref p) if p.bytes_copied > 0) {
                handle.cancel();
                break;
            }
        }
        assert!(handle.cancel_token().is_cancelled());

        let outcome = handle.join().expect("worker should not panic");
        assert_eq!(outcome.state, RunState::Canceled);
        assert!(outcome.bytes_copied < outcome.total_bytes);
        assert!(!outcome.set_path.join("manifest.json").exists());
    }

    #[test]
    fn test_spawn_restore_logs_each_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let backup = spawn_backup(
            plan_for(temp_dir.path()),
            EngineOptions::default(),
            Arc::new(JsonManifestStore),
        );
        let outcome = backup.join().expect("worker should not panic");
        assert_eq!(outcome.state, RunState::Completed);

        let target = temp_dir.path().join("restored");
        let handle = spawn_restore(
            outcome.set_path,
            target.clone(),
            EngineOptions::default(),
            Arc::new(JsonManifestStore),
        );
        let lines: Vec<String> = handle
            .events()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Log(line) => Some(line),
                _ => None,
            })
            .collect();
        let report = handle
            .join()
            .expect("worker should not panic")
            .expect("restore should succeed");

        assert_eq!(report.restored, 2);
        assert_eq!(lines.iter().filter(|l| l.starts_with("Restored ")).count(), 2);
        assert!(lines
            .last()
            .is_some_and(|l| l.starts_with("Restore complete.")));
    }
}
