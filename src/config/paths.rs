//! Path management for chainvault
//!
//! Resolves where the catalog, backups, safety snapshots, audit log and
//! settings live.
//!
//! ## Path Resolution Order
//!
//! 1. `CHAINVAULT_HOME` environment variable (if set)
//! 2. The platform config directory (`~/.config/chainvault` on Linux)

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::VaultError;

/// Manages all paths used by chainvault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    /// Base directory for all chainvault state
    base_dir: PathBuf,
}

impl VaultPaths {
    /// Create a new VaultPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> Result<Self, VaultError> {
        let base_dir = if let Ok(custom) = std::env::var("CHAINVAULT_HOME") {
            PathBuf::from(custom)
        } else {
            ProjectDirs::from("", "", "chainvault")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config("Could not determine a home directory".into())
                })?
        };

        Ok(Self { base_dir })
    }

    /// Create VaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding one subdirectory per backup id
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Side-location for pre-restore safety snapshots
    pub fn snapshot_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the backup catalog
    pub fn catalog_file(&self) -> PathBuf {
        self.base_dir.join("catalog.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Advisory lock serializing backups and restores
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("chainvault.lock")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| VaultError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.backup_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create backup directory: {}", e)))?;

        std::fs::create_dir_all(self.snapshot_dir()).map_err(|e| {
            VaultError::Io(format!("Failed to create snapshot directory: {}", e))
        })?;

        Ok(())
    }

    /// Check if chainvault has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}
