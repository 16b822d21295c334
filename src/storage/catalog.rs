//! Backup catalog
//!
//! The catalog is the durable list of completed backups. All mutations go
//! through [`BackupCatalog::create`], which enforces the chain invariants:
//!
//! - ids are unique
//! - a FULL record has no parent
//! - an INCREMENTAL record's parent exists in the same timeline and its WAL
//!   range starts where the parent's ended
//!
//! [`JsonCatalog`] keeps every record in one JSON file rewritten atomically.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, TimelineId};

use super::file_io::{read_json, write_json_atomic};

/// Metadata store of backup records
pub trait BackupCatalog: Send + Sync {
    /// Persist a new record
    fn create(&self, record: BackupRecord) -> VaultResult<()>;

    /// Look up a record by id
    fn get(&self, backup_id: &BackupId) -> VaultResult<Option<BackupRecord>>;

    /// Most recently created record in a timeline
    fn latest_in_timeline(&self, timeline_id: TimelineId) -> VaultResult<Option<BackupRecord>>;

    /// Ordered chain from the root FULL record to `backup_id`
    fn chain_for(&self, backup_id: &BackupId) -> VaultResult<Vec<BackupRecord>>;

    /// All records, newest first
    fn list(&self) -> VaultResult<Vec<BackupRecord>>;
}

/// Serializable catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogData {
    schema_version: u32,
    records: Vec<BackupRecord>,
}

impl Default for CatalogData {
    fn default() -> Self {
        Self {
            schema_version: 1,
            records: Vec::new(),
        }
    }
}

/// Catalog persisted as `catalog.json`
pub struct JsonCatalog {
    path: PathBuf,
    data: RwLock<BTreeMap<BackupId, BackupRecord>>,
}

impl JsonCatalog {
    /// Open the catalog at `path`, loading existing records
    pub fn open(path: PathBuf) -> VaultResult<Self> {
        let catalog = Self {
            path,
            data: RwLock::new(BTreeMap::new()),
        };
        catalog.load()?;
        Ok(catalog)
    }

    /// Reload records from disk
    pub fn load(&self) -> VaultResult<()> {
        let file_data: CatalogData = read_json(&self.path)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for record in file_data.records {
            data.insert(record.backup_id.clone(), record);
        }

        Ok(())
    }

    fn save(&self, data: &BTreeMap<BackupId, BackupRecord>) -> VaultResult<()> {
        let file_data = CatalogData {
            schema_version: 1,
            records: data.values().cloned().collect(),
        };
        write_json_atomic(&self.path, &file_data)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl BackupCatalog for JsonCatalog {
    fn create(&self, record: BackupRecord) -> VaultResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        validate_new_record(&data, &record)?;

        let id = record.backup_id.clone();
        data.insert(id.clone(), record);

        if let Err(e) = self.save(&data) {
            data.remove(&id);
            return Err(e);
        }

        debug!(backup_id = %id, "Catalog record created");
        Ok(())
    }

    fn get(&self, backup_id: &BackupId) -> VaultResult<Option<BackupRecord>> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.get(backup_id).cloned())
    }

    fn latest_in_timeline(&self, timeline_id: TimelineId) -> VaultResult<Option<BackupRecord>> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data
            .values()
            .filter(|r| r.timeline_id == timeline_id)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.backup_id.cmp(&b.backup_id))
            })
            .cloned())
    }

    fn chain_for(&self, backup_id: &BackupId) -> VaultResult<Vec<BackupRecord>> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        resolve_chain(&data, backup_id)
    }

    fn list(&self) -> VaultResult<Vec<BackupRecord>> {
        let data = self
            .data
            .read()
            .map_err(|e| VaultError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut records: Vec<_> = data.values().cloned().collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(records)
    }
}

/// Check a record against the catalog before it is inserted
fn validate_new_record(
    data: &BTreeMap<BackupId, BackupRecord>,
    record: &BackupRecord,
) -> VaultResult<()> {
    if data.contains_key(&record.backup_id) {
        return Err(VaultError::DuplicateId(record.backup_id.to_string()));
    }

    match (record.backup_type, &record.parent_backup_id) {
        (BackupType::Full, None) => Ok(()),
        (BackupType::Full, Some(parent)) => Err(VaultError::ChainIntegrity(format!(
            "Full backup {} must not have a parent (got {})",
            record.backup_id, parent
        ))),
        (BackupType::Incremental, None) => Err(VaultError::ChainIntegrity(format!(
            "Incremental backup {} has no parent",
            record.backup_id
        ))),
        (BackupType::Incremental, Some(parent_id)) => {
            let parent = data
                .get(parent_id)
                .filter(|p| p.timeline_id == record.timeline_id)
                .ok_or_else(|| {
                    VaultError::ChainIntegrity(format!(
                        "Parent {} of {} does not exist in timeline {}",
                        parent_id, record.backup_id, record.timeline_id
                    ))
                })?;

            if record.wal_range.start != parent.wal_range.end {
                return Err(VaultError::ChainIntegrity(format!(
                    "WAL range of {} starts at {} but parent {} ends at {}",
                    record.backup_id, record.wal_range.start, parent_id, parent.wal_range.end
                )));
            }
            Ok(())
        }
    }
}

/// Walk parent pointers from `backup_id` to the root FULL record
fn resolve_chain(
    data: &BTreeMap<BackupId, BackupRecord>,
    backup_id: &BackupId,
) -> VaultResult<Vec<BackupRecord>> {
    let target = data
        .get(backup_id)
        .ok_or_else(|| VaultError::backup_not_found(backup_id.as_str()))?;

    let mut chain = vec![target.clone()];
    let mut seen = HashSet::from([target.backup_id.clone()]);
    let mut current = target;

    while let Some(parent_id) = &current.parent_backup_id {
        let parent = data.get(parent_id).ok_or_else(|| {
            VaultError::ChainIntegrity(format!(
                "Backup {} points to missing parent {}",
                current.backup_id, parent_id
            ))
        })?;

        if !seen.insert(parent.backup_id.clone()) {
            return Err(VaultError::ChainIntegrity(format!(
                "Cycle in backup chain at {}",
                parent.backup_id
            )));
        }

        chain.push(parent.clone());
        current = parent;
    }

    if !current.is_full() {
        return Err(VaultError::ChainIntegrity(format!(
            "Chain for {} ends at {} which is not a full backup",
            backup_id, current.backup_id
        )));
    }

    chain.reverse();
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Lsn, WalRange};
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn record(
        id: &str,
        backup_type: BackupType,
        parent: Option<&str>,
        timeline: u32,
        range: (u64, u64),
        minutes: i64,
    ) -> BackupRecord {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        BackupRecord {
            backup_id: BackupId::parse(id).unwrap(),
            backup_type,
            timeline_id: TimelineId(timeline),
            parent_backup_id: parent.map(|p| BackupId::parse(p).unwrap()),
            wal_range: WalRange::new(Lsn(range.0), Lsn(range.1)),
            database_artifact_location: PathBuf::from(format!("/backups/{}/database", id)),
            content_artifact_location: PathBuf::from(format!("/backups/{}/files", id)),
            total_size_bytes: 1024,
            created_at: base + Duration::minutes(minutes),
        }
    }

    const B1: &str = "BK_FULL_20250301_120000";
    const B2: &str = "BK_INCR_20250301_121000";
    const B3: &str = "BK_INCR_20250301_122000";

    fn create_chain() -> (JsonCatalog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(temp_dir.path().join("catalog.json")).unwrap();
        catalog
            .create(record(B1, BackupType::Full, None, 1, (10, 100), 0))
            .unwrap();
        catalog
            .create(record(B2, BackupType::Incremental, Some(B1), 1, (100, 200), 10))
            .unwrap();
        catalog
            .create(record(B3, BackupType::Incremental, Some(B2), 1, (200, 300), 20))
            .unwrap();
        (catalog, temp_dir)
    }

    fn id(s: &str) -> BackupId {
        BackupId::parse(s).unwrap()
    }

    #[test]
    fn test_create_and_reload() {
        let (catalog, temp) = create_chain();
        assert_eq!(catalog.list().unwrap().len(), 3);

        let reopened = JsonCatalog::open(temp.path().join("catalog.json")).unwrap();
        assert_eq!(reopened.list().unwrap().len(), 3);
        assert!(reopened.get(&id(B2)).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (catalog, _temp) = create_chain();
        let err = catalog
            .create(record(B1, BackupType::Full, None, 1, (10, 100), 0))
            .unwrap_err();
        assert!(matches!(err, VaultError::DuplicateId(_)));
    }

    #[test]
    fn test_incremental_with_missing_parent_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(temp_dir.path().join("catalog.json")).unwrap();

        let err = catalog
            .create(record(B2, BackupType::Incremental, Some(B1), 1, (100, 200), 10))
            .unwrap_err();
        assert!(matches!(err, VaultError::ChainIntegrity(_)));
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn test_parent_in_other_timeline_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(temp_dir.path().join("catalog.json")).unwrap();
        catalog
            .create(record(B1, BackupType::Full, None, 1, (10, 100), 0))
            .unwrap();

        let err = catalog
            .create(record(B2, BackupType::Incremental, Some(B1), 2, (100, 200), 10))
            .unwrap_err();
        assert!(matches!(err, VaultError::ChainIntegrity(_)));
    }

    #[test]
    fn test_parentless_incremental_and_parented_full_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(temp_dir.path().join("catalog.json")).unwrap();
        catalog
            .create(record(B1, BackupType::Full, None, 1, (10, 100), 0))
            .unwrap();

        let orphan = record(B2, BackupType::Incremental, None, 1, (100, 200), 10);
        assert!(matches!(
            catalog.create(orphan),
            Err(VaultError::ChainIntegrity(_))
        ));

        let parented_full = record(
            "BK_FULL_20250301_130000",
            BackupType::Full,
            Some(B1),
            1,
            (0, 5),
            60,
        );
        assert!(matches!(
            catalog.create(parented_full),
            Err(VaultError::ChainIntegrity(_))
        ));
    }

    #[test]
    fn test_discontinuous_wal_range_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = JsonCatalog::open(temp_dir.path().join("catalog.json")).unwrap();
        catalog
            .create(record(B1, BackupType::Full, None, 1, (10, 100), 0))
            .unwrap();

        let err = catalog
            .create(record(B2, BackupType::Incremental, Some(B1), 1, (150, 200), 10))
            .unwrap_err();
        assert!(matches!(err, VaultError::ChainIntegrity(_)));
    }

    #[test]
    fn test_latest_in_timeline() {
        let (catalog, _temp) = create_chain();
        let latest = catalog.latest_in_timeline(TimelineId(1)).unwrap().unwrap();
        assert_eq!(latest.backup_id, id(B3));
        assert!(catalog.latest_in_timeline(TimelineId(2)).unwrap().is_none());
    }

    #[test]
    fn test_chain_for_orders_root_to_target() {
        let (catalog, _temp) = create_chain();

        let chain = catalog.chain_for(&id(B3)).unwrap();
        let ids: Vec<_> = chain.iter().map(|r| r.backup_id.to_string()).collect();
        assert_eq!(ids, vec![B1, B2, B3]);
        assert!(chain[0].is_full());

        let chain = catalog.chain_for(&id(B2)).unwrap();
        let ids: Vec<_> = chain.iter().map(|r| r.backup_id.to_string()).collect();
        assert_eq!(ids, vec![B1, B2]);

        let chain = catalog.chain_for(&id(B1)).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_chain_for_unknown_id_is_not_found() {
        let (catalog, _temp) = create_chain();
        let err = catalog
            .chain_for(&id("BK_FULL_20200101_000000"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_dangling_pointer_is_chain_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        // A history whose middle link was removed by hand
        let data = CatalogData {
            schema_version: 1,
            records: vec![
                record(B1, BackupType::Full, None, 1, (10, 100), 0),
                record(B3, BackupType::Incremental, Some(B2), 1, (200, 300), 20),
            ],
        };
        write_json_atomic(&path, &data).unwrap();

        let catalog = JsonCatalog::open(path).unwrap();
        let err = catalog.chain_for(&id(B3)).unwrap_err();
        assert!(matches!(err, VaultError::ChainIntegrity(_)));
    }

    #[test]
    fn test_cycle_is_chain_integrity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let data = CatalogData {
            schema_version: 1,
            records: vec![
                record(B2, BackupType::Incremental, Some(B3), 1, (100, 200), 10),
                record(B3, BackupType::Incremental, Some(B2), 1, (200, 300), 20),
            ],
        };
        write_json_atomic(&path, &data).unwrap();

        let catalog = JsonCatalog::open(path).unwrap();
        assert!(matches!(
            catalog.chain_for(&id(B3)),
            Err(VaultError::ChainIntegrity(_))
        ));
    }

    #[test]
    fn test_reads_do_not_mutate() {
        let (catalog, temp) = create_chain();
        let before = std::fs::read(temp.path().join("catalog.json")).unwrap();

        let first = catalog.list().unwrap();
        let _ = catalog.chain_for(&id(B3)).unwrap();
        let second = catalog.list().unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].backup_id, id(B3));
        let after = std::fs::read(temp.path().join("catalog.json")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_failed_save_leaves_catalog_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the catalog file should be makes the rename fail
        let path = temp_dir.path().join("catalog.json");
        let catalog = JsonCatalog::open(path.clone()).unwrap();
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let result = catalog.create(record(B1, BackupType::Full, None, 1, (10, 100), 0));
        assert!(result.is_err());
        assert!(catalog.get(&id(B1)).unwrap().is_none());
    }
}
