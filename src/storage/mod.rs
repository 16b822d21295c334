//! Storage layer for chainvault
//!
//! Provides the backup catalog, the audit log and the atomic JSON file
//! helpers the catalog and backup manifests are written with.

pub mod catalog;
pub mod file_io;

pub use catalog::{BackupCatalog, JsonCatalog};
pub use file_io::{read_json, read_json_required, write_json_atomic};

use crate::audit::AuditLogger;
use crate::config::paths::VaultPaths;
use crate::error::VaultError;

/// Main storage coordinator: where backups live, what is catalogued and
/// who did what
pub struct Storage {
    paths: VaultPaths,
    pub catalog: Box<dyn BackupCatalog>,
    pub audit: AuditLogger,
}

impl Storage {
    /// Open storage under `paths`, creating directories as needed
    pub fn new(paths: VaultPaths) -> Result<Self, VaultError> {
        paths.ensure_directories()?;
        let catalog = JsonCatalog::open(paths.catalog_file())?;
        Ok(Self::with_catalog(paths, Box::new(catalog)))
    }

    /// Use a caller-supplied catalog implementation
    pub fn with_catalog(paths: VaultPaths, catalog: Box<dyn BackupCatalog>) -> Self {
        Self {
            audit: AuditLogger::new(paths.audit_log()),
            catalog,
            paths,
        }
    }

    /// Get the paths configuration
    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Check if storage has been initialized
    pub fn is_initialized(&self) -> bool {
        self.paths.settings_file().exists()
    }
}
