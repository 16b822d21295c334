//! CSV Export functionality
//!
//! Exports the backup catalog as one row per record.

use std::io::Write;

use serde::Serialize;

use crate::error::{VaultError, VaultResult};
use crate::models::BackupRecord;
use crate::storage::Storage;

#[derive(Serialize)]
struct CatalogRow<'a> {
    backup_id: &'a str,
    backup_type: String,
    timeline_id: u32,
    parent_backup_id: &'a str,
    wal_start: String,
    wal_end: String,
    total_size_bytes: u64,
    created_at: String,
    location: String,
}

impl<'a> From<&'a BackupRecord> for CatalogRow<'a> {
    fn from(record: &'a BackupRecord) -> Self {
        Self {
            backup_id: record.backup_id.as_str(),
            backup_type: record.backup_type.to_string(),
            timeline_id: record.timeline_id.value(),
            parent_backup_id: record
                .parent_backup_id
                .as_ref()
                .map(|p| p.as_str())
                .unwrap_or(""),
            wal_start: record.wal_range.start.to_string(),
            wal_end: record.wal_range.end.to_string(),
            total_size_bytes: record.total_size_bytes,
            created_at: record.created_at.to_rfc3339(),
            location: record
                .backup_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Export all catalog records to CSV
pub fn export_catalog_csv<W: Write>(storage: &Storage, writer: W) -> VaultResult<()> {
    let records = storage.catalog.list()?;

    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in &records {
        csv_writer
            .serialize(CatalogRow::from(record))
            .map_err(|e| VaultError::Export(e.to_string()))?;
    }
    csv_writer
        .flush()
        .map_err(|e| VaultError::Export(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::json::tests::{create_test_storage, seed_chain};

    #[test]
    fn test_csv_export() {
        let (_temp_dir, storage) = create_test_storage();
        let chain = seed_chain(&storage);

        let mut output = Vec::new();
        export_catalog_csv(&storage, &mut output).unwrap();

        let mut reader = csv::Reader::from_reader(output.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "backup_id");
        assert_eq!(&headers[4], "wal_start");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], chain[1].backup_id.as_str());
        assert_eq!(&rows[0][3], chain[0].backup_id.as_str());
        assert_eq!(&rows[1][1], "FULL");
        assert_eq!(&rows[1][3], "");
        assert_eq!(&rows[1][5], "0/2000138");
    }

    #[test]
    fn test_empty_catalog_writes_nothing() {
        let (_temp_dir, storage) = create_test_storage();

        let mut output = Vec::new();
        export_catalog_csv(&storage, &mut output).unwrap();
        assert!(output.is_empty());
    }
}
