//! Manifest construction and persistence.
//!
//! `ManifestBuilder` collects entries in processing order during a run.
//! `ManifestStore` is the save/load contract the orchestrators depend on;
//! `JsonManifestStore` is the stock implementation.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{SecondsFormat, Utc};

use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::model::{Manifest, ManifestEntry};

/// Persists and loads manifest documents.
pub trait ManifestStore: Send + Sync {
    fn save(&self, path: &Path, manifest: &Manifest) -> Result<(), EngineError>;
    fn load(&self, path: &Path) -> Result<Manifest, EngineError>;
}

/// Pretty-printed JSON, written to a sibling temp file and renamed into place.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonManifestStore;

impl ManifestStore for JsonManifestStore {
    fn save(&self, path: &Path, manifest: &Manifest) -> Result<(), EngineError> {
        let write_err = |source: io::Error| EngineError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, manifest).map_err(|e| write_err(e.into()))?;
        writer.flush().map_err(write_err)?;
        writer
            .into_inner()
            .map_err(|e| write_err(e.into_error()))?
            .sync_all()
            .map_err(write_err)?;

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(write_err(e));
        }
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Manifest, EngineError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                EngineError::ManifestNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                EngineError::ManifestRead {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        serde_json::from_reader(BufReader::new(file)).map_err(|e| EngineError::ManifestParse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Name of this machine for the manifest header.
pub fn machine_name() -> String {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Accumulates entries for one run. Insertion order is preserved.
#[derive(Debug)]
pub struct ManifestBuilder {
    manifest: Manifest,
    seen: HashSet<String>,
}

impl ManifestBuilder {
    pub fn new(options: &EngineOptions, machine_name: impl Into<String>) -> Self {
        ManifestBuilder {
            manifest: Manifest {
                app_name: options.app_name.clone(),
                version: options.manifest_version.clone(),
                created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
                machine_name: machine_name.into(),
                files: Vec::new(),
                notes: None,
            },
            seen: HashSet::new(),
        }
    }

    pub fn notes(mut self, notes: Option<&str>) -> Self {
        self.manifest.notes = notes.map(str::to_string);
        self
    }

    /// Append an entry.
    ///
    /// # Errors
    /// `DuplicateEntry` if the relative path was already added.
    pub fn push(&mut self, entry: ManifestEntry) -> Result<(), EngineError> {
        if !self.seen.insert(entry.relative_path.clone()) {
            return Err(EngineError::DuplicateEntry {
                relative_path: entry.relative_path,
            });
        }
        self.manifest.files.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.manifest.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.files.is_empty()
    }

    pub fn build(self) -> Manifest {
        self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64) -> ManifestEntry {
        ManifestEntry {
            relative_path: path.to_string(),
            size_bytes: size,
            last_write_utc_ticks: 638_000_000_000_000_000,
            sha256: "00".repeat(32),
        }
    }

    #[test]
    fn test_builder_preserves_insertion_order() {
        let mut builder = ManifestBuilder::new(&EngineOptions::default(), "host");
        builder.push(entry("root/z.txt", 1)).expect("push");
        builder.push(entry("root/a.txt", 2)).expect("push");
        builder.push(entry("root/m.txt", 3)).expect("push");

        let manifest = builder.notes(Some("nightly")).build();
        let order: Vec<&str> = manifest.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(order, vec!["root/z.txt", "root/a.txt", "root/m.txt"]);
        assert_eq!(manifest.app_name, "WinSwitch");
        assert_eq!(manifest.version, "1.0.0");
        assert_eq!(manifest.machine_name, "host");
        assert_eq!(manifest.notes.as_deref(), Some("nightly"));
        assert!(chrono::DateTime::parse_from_rfc3339(&manifest.created_at).is_ok());
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let mut builder = ManifestBuilder::new(&EngineOptions::default(), "host");
        builder.push(entry("root/a.txt", 1)).expect("push");
        let result = builder.push(entry("root/a.txt", 1));
        assert!(matches!(result, Err(EngineError::DuplicateEntry { .. })));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_json_store_save_and_load() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("set").join("manifest.json");

        let mut builder = ManifestBuilder::new(&EngineOptions::default(), "host");
        builder.push(entry("root/a.txt", 10)).expect("push");
        builder.push(entry("root/sub/b.txt", 20)).expect("push");
        let manifest = builder.build();

        JsonManifestStore.save(&path, &manifest).expect("Failed to save");
        assert!(!path.with_extension("json.tmp").exists());

        let text = fs::read_to_string(&path).expect("Failed to read manifest");
        assert!(text.contains("\"RelativePath\": \"root/sub/b.txt\""));

        let loaded = JsonManifestStore.load(&path).expect("Failed to load");
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_json_store_load_missing() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = JsonManifestStore.load(&temp_dir.path().join("manifest.json"));
        assert!(matches!(result, Err(EngineError::ManifestNotFound { .. })));
    }

    #[test]
    fn test_json_store_load_garbage() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("manifest.json");
        fs::write(&path, b"{ not json").expect("Failed to write");
        let result = JsonManifestStore.load(&path);
        assert!(matches!(result, Err(EngineError::ManifestParse { .. })));
    }

    #[test]
    fn test_json_store_loads_minimal_document() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("manifest.json");
        fs::write(
            &path,
            br#"{"AppName":"WinSwitch","Version":"1.0.0","CreatedAt":"","MachineName":"PC"}"#,
        )
        .expect("Failed to write");
        let manifest = JsonManifestStore.load(&path).expect("Failed to load");
        assert!(manifest.files.is_empty());
        assert_eq!(manifest.notes, None);
    }

    #[test]
    fn test_machine_name_is_not_empty() {
        assert!(!machine_name().is_empty());
    }
}
