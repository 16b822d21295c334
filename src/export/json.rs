//! JSON Export functionality
//!
//! Exports the backup catalog to JSON format with schema versioning.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::models::{BackupRecord, BackupType};
use crate::storage::Storage;

/// Current export schema version
pub const EXPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Full catalog export structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogExport {
    /// Schema version for compatibility checking
    pub schema_version: String,

    /// Export timestamp
    pub exported_at: DateTime<Utc>,

    /// Application version that created the export
    pub app_version: String,

    /// All records, newest first
    pub backups: Vec<BackupRecord>,

    /// Export metadata
    pub metadata: ExportMetadata,
}

/// Summary figures for the exported catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub backup_count: usize,
    pub full_count: usize,
    pub incremental_count: usize,

    /// Timelines that have at least one backup
    pub timelines: Vec<u32>,

    /// Sum of all backup sizes
    pub total_size_bytes: u64,

    pub oldest_backup: Option<DateTime<Utc>>,
    pub newest_backup: Option<DateTime<Utc>>,
}

impl CatalogExport {
    /// Snapshot the catalog
    pub fn from_storage(storage: &Storage) -> VaultResult<Self> {
        let backups = storage.catalog.list()?;

        let full_count = backups
            .iter()
            .filter(|r| r.backup_type == BackupType::Full)
            .count();
        let timelines: BTreeSet<u32> = backups.iter().map(|r| r.timeline_id.value()).collect();

        let metadata = ExportMetadata {
            backup_count: backups.len(),
            full_count,
            incremental_count: backups.len() - full_count,
            timelines: timelines.into_iter().collect(),
            total_size_bytes: backups.iter().map(|r| r.total_size_bytes).sum(),
            oldest_backup: backups.iter().map(|r| r.created_at).min(),
            newest_backup: backups.iter().map(|r| r.created_at).max(),
        };

        Ok(Self {
            schema_version: EXPORT_SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            backups,
            metadata,
        })
    }
}

/// Export the catalog to JSON format
pub fn export_catalog_json<W: Write>(
    storage: &Storage,
    writer: &mut W,
    pretty: bool,
) -> VaultResult<()> {
    let export = CatalogExport::from_storage(storage)?;

    let written = if pretty {
        serde_json::to_writer_pretty(writer, &export)
    } else {
        serde_json::to_writer(writer, &export)
    };
    written.map_err(|e| VaultError::Export(e.to_string()))
}
