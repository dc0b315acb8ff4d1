//! # WinSwitch Engine - Incremental Backup Library
//!
//! A headless backup and restore engine that copies selected folders to a
//! removable drive, one timestamped backup set per run.
//! Designed as the foundation for multiple front ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Recursive enumeration of every selected source folder
//! - Collision-free mapping of each source into the backup set
//! - Skip-if-unchanged change detection on size and modification time
//! - Streaming copies with cooperative cancellation and byte-level progress
//! - A SHA-256 digest for every stored file, recorded in a JSON manifest
//! - Manifest-driven restore and audit
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{run_backup, BackupPlan, CancellationToken, EngineOptions, JsonManifestStore,
//!     RunState, SourceSelection};
//!
//! let sources = SourceSelection::resolve(["C:\\Users\\me\\Documents"]);
//! let plan = BackupPlan::new(sources, "E:\\");
//!
//! let outcome = run_backup(
//!     &plan,
//!     &EngineOptions::default(),
//!     &JsonManifestStore,
//!     None,
//!     &CancellationToken::new(),
//! );
//!
//! if outcome.state == RunState::Completed {
//!     println!("{} ({} failures)", outcome.message, outcome.failures.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (BackupPlan, Manifest, RunState, ticks)
//! - **job**: Backup orchestration
//! - **restore**: Restore and audit of existing sets
//! - **worker**: Background threads streaming progress over a channel
//! - **path_map**: Source file to backup set path mapping
//! - **change**: Skip-if-unchanged decisions
//! - **fs_ops**: Tree enumeration and streaming copies
//! - **checksums**: SHA-256 digests
//! - **manifest**: Manifest building and persistence
//! - **layout**: Backup set directories on a destination

pub mod cancel;
pub mod change;
pub mod checksums;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod job;
pub mod layout;
pub mod manifest;
pub mod model;
pub mod path_map;
pub mod progress;
pub mod restore;
pub mod worker;

// Re-export main types and functions
pub use cancel::CancellationToken;
pub use config::EngineOptions;
pub use error::EngineError;
pub use job::run_backup;
pub use layout::{list_backup_sets, BackupSet, BackupSetInfo};
pub use manifest::{JsonManifestStore, ManifestStore};
pub use model::{
    BackupOutcome, BackupPlan, BackupProgress, FileFailure, FileItem, Manifest, ManifestEntry,
    RunState, SourceSelection,
};
pub use progress::{ChannelProgress, ProgressCallback, ProgressEvent, RestoreLog};
pub use restore::{restore_backup_set, verify_backup_set, AuditReport, RestoreReport};
pub use worker::{spawn_backup, spawn_restore, BackupHandle, RestoreHandle, WorkerHandle};
