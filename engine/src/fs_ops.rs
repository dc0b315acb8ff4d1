//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating source trees lazily
//! - Streaming file copies with cancellation and per-chunk progress
//! - Creating directories recursively

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use crate::model::system_time_to_ticks;

/// A regular file found beneath a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
    /// Modification time in ticks
    pub modified: i64,
}

/// Lazy walk over every regular file beneath one root.
///
/// Unreadable directories are skipped, symbolic links are neither followed
/// nor yielded, and files that vanish or cannot be stat'ed are dropped.
pub struct TreeWalk {
    inner: walkdir::IntoIter,
}

impl Iterator for TreeWalk {
    type Item = SourceFile;

    fn next(&mut self) -> Option<SourceFile> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        path = ?e.path(),
                        error = %e,
                        "Skipping inaccessible entry"
                    );
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Dropping file that cannot be stat'ed");
                    continue;
                }
            };
            let modified = match metadata.modified() {
                Ok(t) => system_time_to_ticks(t),
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Dropping file without modification time");
                    continue;
                }
            };

            return Some(SourceFile {
                path: entry.into_path(),
                size: metadata.len(),
                modified,
            });
        }
    }
}

/// Start walking the tree beneath `root`.
///
/// # Errors
/// Returns `EnumerationFailed` when the root itself cannot be listed; the
/// caller decides whether that is fatal.
pub fn enumerate_tree(root: &Path) -> Result<TreeWalk, EngineError> {
    fs::read_dir(root).map_err(|e| EngineError::EnumerationFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    Ok(TreeWalk {
        inner: WalkDir::new(root).follow_links(false).into_iter(),
    })
}

/// Stream `src` into `dst` through `buffer`, then stamp `dst` with `modified`.
///
/// `on_chunk` is called with the size of every chunk after it is written.
/// Cancellation is checked before each chunk is read; an in-flight chunk is
/// always finished and a partially written destination is left in place.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_streaming<F>(
    src: &Path,
    dst: &Path,
    modified: SystemTime,
    buffer: &mut [u8],
    cancel: &CancellationToken,
    mut on_chunk: F,
) -> Result<u64, EngineError>
where
    F: FnMut(u64),
{
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::ReadError {
        path: src.to_path_buf(),
        source: e,
    })?;

    let mut dst_file = fs::File::create(dst).map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;

    let mut bytes_copied = 0u64;
    loop {
        cancel.check()?;

        let read = match src_file.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: src.to_path_buf(),
                    source: e,
                })
            }
        };

        dst_file
            .write_all(&buffer[..read])
            .map_err(|e| EngineError::WriteError {
                path: dst.to_path_buf(),
                source: e,
            })?;

        bytes_copied += read as u64;
        on_chunk(read as u64);
    }

    dst_file.flush().map_err(|e| EngineError::WriteError {
        path: dst.to_path_buf(),
        source: e,
    })?;
    drop(dst_file);

    filetime::set_file_mtime(dst, FileTime::from_system_time(modified)).map_err(|e| {
        EngineError::WriteError {
            path: dst.to_path_buf(),
            source: e,
        }
    })?;

    Ok(bytes_copied)
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns EngineError if directory creation fails
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), EngineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => return Ok(()),
    };

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(parent).map_err(|e| EngineError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: parent.to_path_buf(),
            source: e,
        }),
    }
}
