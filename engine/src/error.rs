//! Error types for the backup engine.
//!
//! The primary error type is `EngineError`. Run-level errors stop a backup or
//! restore; per-file errors are converted into a `FileFailure` record and
//! reported through the progress channel instead of propagating.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the engine.
///
/// Every variant that concerns a path renders both the path and the
/// underlying cause so that a logged message is enough to debug a failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backup set root could not be created
    #[error("Cannot create backup folder '{}': {source}", path.display())]
    SetCreationFailed { path: PathBuf, source: io::Error },

    /// Failed to read from a file
    #[error("Failed to read '{}': {source}", path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Failed to write to a file
    #[error("Failed to write '{}': {source}", path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory '{}': {source}", path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory
    #[error("Failed to create directory '{}': {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Path is unusable for the requested operation
    #[error("Invalid path '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// A recorded modification time cannot be represented on this platform
    #[error("Modification time of '{}' is out of range: {ticks} ticks", path.display())]
    InvalidTimestamp { path: PathBuf, ticks: i64 },

    /// No manifest exists in the chosen backup set
    #[error("Manifest not found: {}", path.display())]
    ManifestNotFound { path: PathBuf },

    /// The manifest file exists but could not be read
    #[error("Failed to read manifest '{}': {source}", path.display())]
    ManifestRead { path: PathBuf, source: io::Error },

    /// The manifest file is not a valid manifest document
    #[error("Failed to parse manifest '{}': {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The manifest could not be persisted
    #[error("Failed to write manifest '{}': {source}", path.display())]
    ManifestWrite { path: PathBuf, source: io::Error },

    /// A relative path was added to a manifest twice
    #[error("Duplicate manifest entry: {relative_path}")]
    DuplicateEntry { relative_path: String },

    /// The operation was canceled through its cancellation token
    #[error("Operation canceled")]
    Cancelled,

    /// Catch-all for unexpected errors
    #[error("Engine error: {message}")]
    Unknown { message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SetCreationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::ManifestRead { source, .. }
            | Self::ManifestWrite { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True if this error represents a user-requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path_and_cause() {
        let err = EngineError::ReadError {
            path: PathBuf::from("/data/a.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "access is denied"),
        };
        let text = err.to_string();
        assert!(text.contains("/data/a.txt"));
        assert!(text.contains("access is denied"));
    }

    #[test]
    fn test_raw_os_error() {
        let err = EngineError::WriteError {
            path: PathBuf::from("x"),
            source: io::Error::from_raw_os_error(13),
        };
        assert_eq!(err.raw_os_error(), Some(13));
        assert_eq!(EngineError::Cancelled.raw_os_error(), None);
    }

    #[test]
    fn test_is_cancelled() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::Unknown {
            message: "boom".to_string()
        }
        .is_cancelled());
    }

    #[test]
    fn test_invalid_timestamp_names_path() {
        let err = EngineError::InvalidTimestamp {
            path: PathBuf::from("root/a.txt"),
            ticks: -5,
        };
        let text = err.to_string();
        assert!(text.contains("root/a.txt"));
        assert!(text.contains("-5"));
    }
}
