//! YAML Export functionality
//!
//! Exports the backup catalog to YAML format for human review.

use std::io::Write;

use crate::error::{VaultError, VaultResult};
use crate::export::json::CatalogExport;
use crate::storage::Storage;

/// Export the catalog to YAML format
pub fn export_catalog_yaml<W: Write>(storage: &Storage, writer: &mut W) -> VaultResult<()> {
    let export = CatalogExport::from_storage(storage)?;

    writeln!(writer, "# chainvault catalog export")
        .and_then(|_| writeln!(writer, "# Generated: {}", export.exported_at))
        .and_then(|_| writeln!(writer, "# App Version: {}", export.app_version))
        .and_then(|_| writeln!(writer))
        .map_err(|e| VaultError::Export(e.to_string()))?;

    serde_yaml::to_writer(writer, &export).map_err(|e| VaultError::Export(e.to_string()))?;

    Ok(())
}
