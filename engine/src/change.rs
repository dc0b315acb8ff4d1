//! Change detection.
//!
//! A file is considered already stored when the destination exists with the
//! exact size and modification time of the source. Content is never compared:
//! a file whose bytes changed but whose mtime was reset to the old value is
//! skipped. This is a known limitation of metadata-only detection.

use crate::model::system_time_to_ticks;
use std::fs;
use std::io;
use std::path::Path;

/// Outcome of comparing a source file against its stored copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    CopyNeeded,
    SkipIdentical,
}

/// Size and modification ticks of an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredFile {
    pub size: u64,
    pub modified: i64,
}

/// Decide whether a source file must be copied.
pub fn detect_change(source_size: u64, source_modified: i64, stored: Option<StoredFile>) -> ChangeDecision {
    match stored {
        Some(dst) if dst.size == source_size && dst.modified == source_modified => {
            ChangeDecision::SkipIdentical
        }
        _ => ChangeDecision::CopyNeeded,
    }
}

/// Stat a destination path.
///
/// Returns `Ok(None)` when nothing usable is there: the path is missing or is
/// not a regular file.
pub fn stat_stored_file(path: &Path) -> io::Result<Option<StoredFile>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    Ok(Some(StoredFile {
        size: metadata.len(),
        modified: system_time_to_ticks(metadata.modified()?),
    }))
}
