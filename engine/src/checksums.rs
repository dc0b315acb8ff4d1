//! Content digests.
//!
//! Files are hashed with SHA-256 through the same reusable buffer the copy
//! engine streams with. Digests are rendered as lowercase hex.

use crate::cancel::CancellationToken;
use crate::error::EngineError;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Hex-encoded SHA-256 of an in-memory buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Digest and length of a file's bytes, measured in the same pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub sha256: String,
    pub size: u64,
}

/// Stream a file through SHA-256, counting the bytes hashed.
///
/// Cancellation is checked before every chunk read.
pub fn hash_file(
    path: &Path,
    buffer: &mut [u8],
    cancel: &CancellationToken,
) -> Result<FileDigest, EngineError> {
    let mut file = File::open(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut size = 0u64;
    loop {
        cancel.check()?;
        match file.read(buffer) {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buffer[..n]);
                size += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(FileDigest {
        sha256: format!("{:x}", hasher.finalize()),
        size,
    })
}

/// Hex SHA-256 of a file. See [`hash_file`].
pub fn compute_file_checksum(
    path: &Path,
    buffer: &mut [u8],
    cancel: &CancellationToken,
) -> Result<String, EngineError> {
    hash_file(path, buffer, cancel).map(|digest| digest.sha256)
}

/// Compare two hex digests, ignoring case.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}
