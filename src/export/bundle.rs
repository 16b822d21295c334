//! Backup bundle export
//!
//! Packs one backup directory into a single `<backup_id>.tar.gz` for
//! download or off-site copies. Entries are prefixed with the backup id so
//! the bundle unpacks into its own directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;
use tracing::info;

use crate::backup::verify_backup;
use crate::error::{VaultError, VaultResult};
use crate::models::BackupId;
use crate::storage::Storage;

/// Write `<out_dir>/<backup_id>.tar.gz` and return its path
///
/// The backup is verified against its manifest first; a damaged backup is
/// never bundled.
pub fn export_bundle(
    storage: &Storage,
    backup_id: &BackupId,
    out_dir: &Path,
) -> VaultResult<PathBuf> {
    let record = storage
        .catalog
        .get(backup_id)?
        .ok_or_else(|| VaultError::backup_not_found(backup_id.as_str()))?;
    verify_backup(&record)?;

    let backup_dir = record
        .backup_dir()
        .ok_or_else(|| VaultError::Export(format!("Backup {} has no directory", backup_id)))?;

    fs::create_dir_all(out_dir)
        .map_err(|e| VaultError::Export(format!("Failed to create {}: {}", out_dir.display(), e)))?;
    let bundle_path = out_dir.join(format!("{}.tar.gz", backup_id));

    let file = File::create(&bundle_path).map_err(|e| {
        VaultError::Export(format!("Failed to create {}: {}", bundle_path.display(), e))
    })?;
    let mut builder = Builder::new(GzEncoder::new(BufWriter::new(file), Compression::default()));
    builder
        .append_dir_all(backup_id.as_str(), backup_dir)
        .map_err(|e| {
            VaultError::Export(format!("Failed to archive {}: {}", backup_dir.display(), e))
        })?;

    let mut writer = builder
        .into_inner()
        .and_then(|encoder| encoder.finish())
        .map_err(|e| VaultError::Export(format!("Failed to finish bundle: {}", e)))?;
    writer
        .flush()
        .map_err(|e| VaultError::Export(format!("Failed to flush bundle: {}", e)))?;

    info!(%backup_id, bundle = %bundle_path.display(), "exported backup bundle");
    Ok(bundle_path)
}
