//! Export module for chainvault
//!
//! - CSV: one row per catalogued backup (spreadsheet-compatible)
//! - JSON: machine-readable catalog export with summary metadata
//! - YAML: human-readable catalog export
//! - Bundle: a single backup directory packed as `<backup_id>.tar.gz`

pub mod bundle;
pub mod csv;
pub mod json;
pub mod yaml;

use std::io::Write;

use clap::ValueEnum;

use crate::error::VaultResult;
use crate::storage::Storage;

pub use self::bundle::export_bundle;
pub use self::csv::export_catalog_csv;
pub use self::json::{export_catalog_json, CatalogExport, ExportMetadata, EXPORT_SCHEMA_VERSION};
pub use self::yaml::export_catalog_yaml;

/// Output format of a catalog export
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// JSON (full catalog with metadata)
    Json,
    /// YAML (full catalog, human-readable)
    Yaml,
    /// CSV (one row per backup)
    Csv,
}

/// Write the catalog in `format`
pub fn export_catalog<W: Write>(
    storage: &Storage,
    format: ExportFormat,
    writer: &mut W,
) -> VaultResult<()> {
    match format {
        ExportFormat::Json => export_catalog_json(storage, writer, true),
        ExportFormat::Yaml => export_catalog_yaml(storage, writer),
        ExportFormat::Csv => export_catalog_csv(storage, writer),
    }
}
