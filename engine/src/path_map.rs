//! Mapping source files into a backup set's data tree.
//!
//! Every source root gets a filesystem-safe token derived from its absolute
//! path. Files land under `data/<token>/<relative path>` and the manifest
//! records `<token>/<relative path>` with forward slashes.
//!
//! Tokens are built by joining the root's components with `_`. Characters that
//! would make that ambiguous (`_`, `%`) or that removable-media filesystems
//! reject are percent-encoded, so two distinct roots never share a token.

use crate::error::EngineError;
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf, Prefix};

/// Token used for a bare filesystem root such as `/`.
const ROOT_TOKEN: &str = "_";

/// Destination of a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedPath {
    pub destination_path: PathBuf,
    pub relative_path: String,
}

fn encode_component(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '%' | '_' | '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => {
                let _ = write!(out, "%{:02X}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "%{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
}

fn encoded(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    encode_component(raw, &mut out);
    out
}

/// Derive the data-tree token for a source root.
pub fn source_token(root: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();

    for component in root.components() {
        match component {
            Component::Prefix(prefix) => match prefix.kind() {
                Prefix::Disk(letter) | Prefix::VerbatimDisk(letter) => {
                    parts.push((letter as char).to_ascii_uppercase().to_string());
                }
                Prefix::UNC(server, share) | Prefix::VerbatimUNC(server, share) => {
                    parts.push("UNC".to_string());
                    parts.push(encoded(&server.to_string_lossy()));
                    parts.push(encoded(&share.to_string_lossy()));
                }
                Prefix::DeviceNS(name) | Prefix::Verbatim(name) => {
                    parts.push(encoded(&name.to_string_lossy()));
                }
            },
            Component::Normal(name) => parts.push(encoded(&name.to_string_lossy())),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => parts.push("%2E%2E".to_string()),
        }
    }

    if parts.is_empty() {
        ROOT_TOKEN.to_string()
    } else {
        parts.join("_")
    }
}

/// Map `file` (somewhere beneath `source_root`) into `data_dir`.
pub fn map_path(data_dir: &Path, source_root: &Path, file: &Path) -> Result<MappedPath, EngineError> {
    let rel = file.strip_prefix(source_root).map_err(|_| EngineError::InvalidPath {
        path: file.to_path_buf(),
        reason: format!("not beneath source root {}", source_root.display()),
    })?;

    let token = source_token(source_root);
    let mut destination_path = data_dir.join(&token);
    let mut relative_path = token;
    let mut depth = 0;

    for component in rel.components() {
        match component {
            Component::Normal(name) => {
                destination_path.push(name);
                relative_path.push('/');
                relative_path.push_str(&name.to_string_lossy());
                depth += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(EngineError::InvalidPath {
                    path: file.to_path_buf(),
                    reason: "unexpected component in relative path".to_string(),
                })
            }
        }
    }

    if depth == 0 {
        return Err(EngineError::InvalidPath {
            path: file.to_path_buf(),
            reason: "path is the source root itself".to_string(),
        });
    }

    Ok(MappedPath {
        destination_path,
        relative_path,
    })
}

/// Translate a manifest relative path back to the host convention.
///
/// Each `/`-separated segment must be a single plain name; absolute paths,
/// drive prefixes and `..` are rejected so a manifest can never point outside
/// the directory it is resolved against.
pub fn manifest_path_to_native(relative_path: &str) -> Result<PathBuf, EngineError> {
    let invalid = |reason: &str| EngineError::InvalidPath {
        path: PathBuf::from(relative_path),
        reason: reason.to_string(),
    };

    let mut native = PathBuf::new();
    for segment in relative_path.split('/') {
        if segment.is_empty() {
            continue;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => native.push(name),
            _ => return Err(invalid("segment is not a plain file name")),
        }
    }

    if native.as_os_str().is_empty() {
        return Err(invalid("empty path"));
    }
    Ok(native)
}
