//! On-disk layout of backup sets.
//!
//! ```text
//! <destination root>/WinSwitch/Backups/<yyyyMMdd_HHmmss>/manifest.json
//! <destination root>/WinSwitch/Backups/<yyyyMMdd_HHmmss>/data/<source token>/<relative path>
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::EngineOptions;
use crate::error::EngineError;
use crate::model::BackupPlan;

/// Paths of one backup set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    root: PathBuf,
    data_dir: PathBuf,
    manifest_path: PathBuf,
}

impl BackupSet {
    /// The set a plan writes into.
    pub fn for_plan(plan: &BackupPlan, options: &EngineOptions) -> Self {
        let root = backups_root(plan.destination_root(), options).join(plan.set_name());
        Self::open(root, options)
    }

    /// An existing set at `root`.
    pub fn open<P: AsRef<Path>>(root: P, options: &EngineOptions) -> Self {
        let root = root.as_ref().to_path_buf();
        BackupSet {
            data_dir: root.join(&options.data_folder),
            manifest_path: root.join(&options.manifest_file),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }
}

/// Directory holding every backup set on a destination.
pub fn backups_root(destination_root: &Path, options: &EngineOptions) -> PathBuf {
    destination_root
        .join(&options.app_folder)
        .join(&options.backups_folder)
}

/// Summary of an existing backup set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSetInfo {
    pub name: String,
    pub path: PathBuf,
    /// False for runs that were canceled or failed to finalize
    pub has_manifest: bool,
}

/// List backup sets on a destination, oldest first.
///
/// A destination that has never been backed up to yields an empty list.
pub fn list_backup_sets(
    destination_root: &Path,
    options: &EngineOptions,
) -> Result<Vec<BackupSetInfo>, EngineError> {
    let root = backups_root(destination_root, options);
    let entries = match fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(EngineError::EnumerationFailed {
                path: root,
                source: e,
            })
        }
    };

    let mut sets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::EnumerationFailed {
            path: root.clone(),
            source: e,
        })?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        sets.push(BackupSetInfo {
            name: entry.file_name().to_string_lossy().into_owned(),
            has_manifest: path.join(&options.manifest_file).is_file(),
            path,
        });
    }

    sets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceSelection;
    use chrono::{Local, TimeZone};

    #[test]
    fn test_set_paths_for_plan() {
        let when = Local.with_ymd_and_hms(2025, 9, 2, 9, 15, 22).unwrap();
        let plan = BackupPlan::at(SourceSelection::default(), "/mnt/usb", when);
        let set = BackupSet::for_plan(&plan, &EngineOptions::default());

        let expected = Path::new("/mnt/usb")
            .join("WinSwitch")
            .join("Backups")
            .join("20250902_091522");
        assert_eq!(set.root(), expected);
        assert_eq!(set.data_dir(), expected.join("data"));
        assert_eq!(set.manifest_path(), expected.join("manifest.json"));
    }

    #[test]
    fn test_list_backup_sets() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let options = EngineOptions::default();
        assert!(list_backup_sets(temp_dir.path(), &options)
            .expect("Failed to list")
            .is_empty());

        let root = backups_root(temp_dir.path(), &options);
        fs::create_dir_all(root.join("20250902_091522")).expect("Failed to create set");
        fs::create_dir_all(root.join("20240101_000000")).expect("Failed to create set");
        fs::write(root.join("20250902_091522").join("manifest.json"), b"{}")
            .expect("Failed to write manifest");
        fs::write(root.join("stray.txt"), b"x").expect("Failed to write stray file");

        let sets = list_backup_sets(temp_dir.path(), &options).expect("Failed to list");
        let names: Vec<&str> = sets.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["20240101_000000", "20250902_091522"]);
        assert!(!sets[0].has_manifest);
        assert!(sets[1].has_manifest);
    }
}
