//! Engine options.
//!
//! Everything here has a sensible default; callers override individual fields
//! with struct update syntax.

/// Tunables and on-disk naming used by the backup and restore orchestrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Size of the reusable buffer used for copy and hash streaming
    pub buffer_size: usize,

    /// Folder created under the destination root
    pub app_folder: String,

    /// Folder under `app_folder` holding one directory per backup set
    pub backups_folder: String,

    /// Folder inside a backup set holding copied file bytes
    pub data_folder: String,

    /// File name of the manifest at the backup set root
    pub manifest_file: String,

    /// Application name written into every manifest
    pub app_name: String,

    /// Manifest format version written into every manifest
    pub manifest_version: String,
}

/// 1 MiB
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            app_folder: "WinSwitch".to_string(),
            backups_folder: "Backups".to_string(),
            data_folder: "data".to_string(),
            manifest_file: "manifest.json".to_string(),
            app_name: "WinSwitch".to_string(),
            manifest_version: "1.0.0".to_string(),
        }
    }
}

impl EngineOptions {
    /// Buffer size clamped to at least one byte.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }
}
