//! Core data model for backup runs.
//!
//! This module defines the main data structures shared by the orchestrators:
//! - SourceSelection, BackupPlan: what to back up and where
//! - FileItem: a single candidate file within a run
//! - Manifest, ManifestEntry: the persisted catalog of a backup set
//! - BackupProgress, RunState, BackupOutcome: what a run reports

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Modification-time ticks per second (one tick is 100 ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

const NANOS_PER_TICK: u128 = 100;

/// Convert a timestamp to ticks (100 ns intervals since 0001-01-01, UTC).
pub fn system_time_to_ticks(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => UNIX_EPOCH_TICKS + (after.as_nanos() / NANOS_PER_TICK) as i64,
        Err(e) => {
            let before = e.duration();
            let ticks = before.as_nanos().div_ceil(NANOS_PER_TICK) as i64;
            UNIX_EPOCH_TICKS - ticks
        }
    }
}

/// Inverse of [`system_time_to_ticks`].
///
/// Returns `None` when `ticks` lies outside what `SystemTime` can represent.
pub fn ticks_to_system_time(ticks: i64) -> Option<SystemTime> {
    let offset = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let magnitude = offset.unsigned_abs();
    let secs = magnitude / TICKS_PER_SECOND as u64;
    let nanos = (magnitude % TICKS_PER_SECOND as u64) as u32 * NANOS_PER_TICK as u32;
    let duration = Duration::new(secs, nanos);
    if offset >= 0 {
        UNIX_EPOCH.checked_add(duration)
    } else {
        UNIX_EPOCH.checked_sub(duration)
    }
}

/// Ordered set of absolute directories to back up.
///
/// Entries are de-duplicated case-insensitively (first spelling wins) and
/// anything that is not an existing directory at resolve time is dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSelection {
    paths: Vec<PathBuf>,
}

impl SourceSelection {
    pub fn resolve<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();

        for candidate in candidates {
            let raw = candidate.as_ref();
            let trimmed = match raw.to_str() {
                Some(s) => PathBuf::from(s.trim()),
                None => raw.to_path_buf(),
            };
            if trimmed.as_os_str().is_empty() {
                continue;
            }

            let absolute = match std::path::absolute(&trimmed) {
                Ok(p) => p.components().collect::<PathBuf>(),
                Err(e) => {
                    tracing::warn!(path = %trimmed.display(), error = %e, "Excluding source");
                    continue;
                }
            };

            if !absolute.is_dir() {
                tracing::warn!(path = %absolute.display(), "Excluding source that is not a directory");
                continue;
            }

            let key = absolute.to_string_lossy().to_lowercase();
            if seen.insert(key) {
                paths.push(absolute);
            }
        }

        SourceSelection { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Everything needed to start one backup run. Immutable once built.
#[derive(Debug, Clone)]
pub struct BackupPlan {
    sources: SourceSelection,
    destination_root: PathBuf,
    label: String,
    set_name: String,
    notes: Option<String>,
}

impl BackupPlan {
    /// Plan a new backup set named after the current local time.
    pub fn new<P: AsRef<Path>>(sources: SourceSelection, destination_root: P) -> Self {
        Self::at(sources, destination_root, Local::now())
    }

    /// Plan a backup set named after `when`.
    pub fn at<P: AsRef<Path>>(
        sources: SourceSelection,
        destination_root: P,
        when: DateTime<Local>,
    ) -> Self {
        BackupPlan {
            sources,
            destination_root: destination_root.as_ref().to_path_buf(),
            label: when.format("%Y-%m-%d %H:%M:%S").to_string(),
            set_name: when.format("%Y%m%d_%H%M%S").to_string(),
            notes: None,
        }
    }

    /// Plan a run into an existing backup set, picking up where it left off.
    pub fn resume<P: AsRef<Path>>(
        sources: SourceSelection,
        destination_root: P,
        set_name: impl Into<String>,
    ) -> Self {
        let mut plan = Self::new(sources, destination_root);
        plan.set_name = set_name.into();
        plan
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn sources(&self) -> &SourceSelection {
        &self.sources
    }

    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Human-readable timestamp, e.g. `2025-09-02 09:15:22`.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Machine-sortable backup set directory name, e.g. `20250902_091522`.
    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// A single candidate file discovered during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileItem {
    /// Full source path
    pub source_path: PathBuf,

    /// Full destination path inside the backup set's data tree
    pub destination_path: PathBuf,

    /// Manifest-facing path, forward-slash separated, prefixed by the source token
    pub relative_path: String,

    /// File size in bytes at enumeration time
    pub file_size: u64,

    /// Modification time at enumeration time, in ticks
    pub last_modified: i64,
}

/// One record per file materialized in a backup set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    pub relative_path: String,
    pub size_bytes: u64,
    pub last_write_utc_ticks: i64,
    /// Hex-encoded SHA-256 of the stored bytes
    pub sha256: String,
}

/// The catalog persisted at the root of every backup set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Manifest {
    pub app_name: String,
    pub version: String,
    /// RFC 3339 creation time (UTC)
    pub created_at: String,
    pub machine_name: String,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Transient snapshot delivered to the progress observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupProgress {
    pub bytes_copied: u64,
    pub total_bytes: u64,
    /// Path being processed, or a status line such as `Skipped: <path>`
    pub current: String,
}

impl BackupProgress {
    /// Whole-number percentage; 0 when nothing is planned.
    pub fn percent(&self) -> u32 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_copied as u128 * 100) / self.total_bytes as u128).min(100) as u32
    }
}

/// Backup run lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Enumerating,
    Transferring,
    Finalizing,
    /// Data and manifest are on disk
    Completed,
    /// Data is on disk but the manifest could not be written
    PartiallyFailed,
    Canceled,
    Failed,
}

impl RunState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::PartiallyFailed | RunState::Canceled | RunState::Failed
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "Idle",
            RunState::Preparing => "Preparing",
            RunState::Enumerating => "Enumerating",
            RunState::Transferring => "Transferring",
            RunState::Finalizing => "Finalizing",
            RunState::Completed => "Completed",
            RunState::PartiallyFailed => "PartiallyFailed",
            RunState::Canceled => "Canceled",
            RunState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// A file that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
    pub error_code: Option<i32>,
}

/// Terminal result of a backup run.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub state: RunState,
    /// Backup set directory (may not exist if preparation failed)
    pub set_path: PathBuf,
    pub message: String,
    /// Files whose bytes were streamed this run
    pub files_copied: usize,
    /// Files already present and unchanged
    pub files_skipped: usize,
    pub failures: Vec<FileFailure>,
    /// Entries in the manifest (written or attempted)
    pub files_recorded: usize,
    pub bytes_copied: u64,
    pub total_bytes: u64,
}

impl BackupOutcome {
    pub(crate) fn new(set_path: PathBuf) -> Self {
        BackupOutcome {
            state: RunState::Idle,
            set_path,
            message: String::new(),
            files_copied: 0,
            files_skipped: 0,
            failures: Vec::new(),
            files_recorded: 0,
            bytes_copied: 0,
            total_bytes: 0,
        }
    }

    /// True when the data reached the backup set, with or without a manifest.
    pub fn data_ok(&self) -> bool {
        matches!(self.state, RunState::Completed | RunState::PartiallyFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    #[test]
    fn test_ticks_at_unix_epoch() {
        assert_eq!(system_time_to_ticks(UNIX_EPOCH), UNIX_EPOCH_TICKS);
        assert_eq!(ticks_to_system_time(UNIX_EPOCH_TICKS), Some(UNIX_EPOCH));
    }

    #[test]
    fn test_ticks_round_trip() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_700);
        let ticks = system_time_to_ticks(time);
        assert_eq!(ticks_to_system_time(ticks), Some(time));

        let before = UNIX_EPOCH - Duration::new(86_400, 500);
        let ticks = system_time_to_ticks(before);
        assert!(ticks < UNIX_EPOCH_TICKS);
        assert_eq!(ticks_to_system_time(ticks), Some(before));
    }

    #[test]
    fn test_ticks_out_of_range() {
        assert_eq!(ticks_to_system_time(-9_000_000_000_000_000_000), None);
        assert_eq!(ticks_to_system_time(i64::MIN), None);
    }

    #[test]
    fn test_ticks_truncate_sub_tick_precision() {
        let time = UNIX_EPOCH + Duration::new(10, 199);
        assert_eq!(system_time_to_ticks(time), UNIX_EPOCH_TICKS + 10 * TICKS_PER_SECOND + 1);
    }

    #[test]
    fn test_source_selection_dedupes_and_filters() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let docs = temp_dir.path().join("Docs");
        fs::create_dir(&docs).expect("Failed to create docs");
        let pics = temp_dir.path().join("pics");
        fs::create_dir(&pics).expect("Failed to create pics");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").expect("Failed to write file");

        let upper = docs.to_string_lossy().to_uppercase();
        let selection = SourceSelection::resolve(vec![
            docs.clone(),
            pics.clone(),
            PathBuf::from(format!("  {}  ", docs.display())),
            temp_dir.path().join("missing"),
            file,
            PathBuf::from(""),
            PathBuf::from(upper),
        ]);

        assert_eq!(selection.paths(), &[docs, pics]);
    }

    #[test]
    fn test_plan_names() {
        let when = Local.with_ymd_and_hms(2025, 9, 2, 9, 15, 22).unwrap();
        let plan = BackupPlan::at(SourceSelection::default(), "/mnt/usb", when).with_notes("laptop");
        assert_eq!(plan.label(), "2025-09-02 09:15:22");
        assert_eq!(plan.set_name(), "20250902_091522");
        assert_eq!(plan.notes(), Some("laptop"));
        assert_eq!(plan.destination_root(), Path::new("/mnt/usb"));

        let resumed = BackupPlan::resume(SourceSelection::default(), "/mnt/usb", "20240101_000000");
        assert_eq!(resumed.set_name(), "20240101_000000");
    }

    #[test]
    fn test_progress_percent() {
        let progress = BackupProgress {
            bytes_copied: 15,
            total_bytes: 30,
            current: String::new(),
        };
        assert_eq!(progress.percent(), 50);

        let empty = BackupProgress {
            bytes_copied: 0,
            total_bytes: 0,
            current: String::new(),
        };
        assert_eq!(empty.percent(), 0);
    }

    #[test]
    fn test_manifest_field_names() {
        let manifest = Manifest {
            app_name: "WinSwitch".to_string(),
            version: "1.0.0".to_string(),
            created_at: "2025-09-02T07:15:22Z".to_string(),
            machine_name: "host".to_string(),
            files: vec![ManifestEntry {
                relative_path: "home_me/a.txt".to_string(),
                size_bytes: 10,
                last_write_utc_ticks: 42,
                sha256: "ab".to_string(),
            }],
            notes: None,
        };
        let json = serde_json::to_string(&manifest).expect("serialize");
        assert!(json.contains("\"AppName\":\"WinSwitch\""));
        assert!(json.contains("\"MachineName\""));
        assert!(json.contains("\"RelativePath\":\"home_me/a.txt\""));
        assert!(json.contains("\"LastWriteUtcTicks\":42"));
        assert!(json.contains("\"Sha256\""));
        assert!(!json.contains("Notes"));
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::PartiallyFailed.is_terminal());
        assert!(RunState::Canceled.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Transferring.is_terminal());
        assert_eq!(RunState::PartiallyFailed.to_string(), "PartiallyFailed");
    }
}
