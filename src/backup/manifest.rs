//! Per-backup manifest
//!
//! `manifest.json` sits at the root of every backup directory. It repeats
//! the catalog metadata, names the captured WAL segments and content files,
//! and carries a SHA-256 digest for every artifact so a chain can be checked
//! before anything on the live system is touched.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, TimelineId, WalRange};
use crate::storage::{read_json_required, write_json_atomic};

pub const MANIFEST_FILE: &str = "manifest.json";

fn default_schema_version() -> u32 {
    1
}

/// Description of one backup directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub backup_id: BackupId,
    pub backup_type: BackupType,
    #[serde(default)]
    pub parent_backup_id: Option<BackupId>,
    pub timeline_id: TimelineId,
    pub wal_range: WalRange,
    /// Original names of the WAL segments stored under `database/wal/`
    #[serde(default)]
    pub wal_segments: Vec<String>,
    /// Content files in `files/content.tar.gz`, relative to the content root
    #[serde(default)]
    pub content_files: Vec<PathBuf>,
    /// Artifact path relative to the backup directory -> hex SHA-256
    pub checksums: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl BackupManifest {
    /// Build a manifest for the artifacts currently in `backup_dir`
    pub fn build(
        record: &BackupRecord,
        backup_dir: &Path,
        wal_segments: Vec<String>,
        content_files: Vec<PathBuf>,
    ) -> VaultResult<Self> {
        Ok(Self {
            schema_version: default_schema_version(),
            backup_id: record.backup_id.clone(),
            backup_type: record.backup_type,
            parent_backup_id: record.parent_backup_id.clone(),
            timeline_id: record.timeline_id,
            wal_range: record.wal_range,
            wal_segments,
            content_files,
            checksums: collect_checksums(backup_dir)?,
            created_at: record.created_at,
        })
    }

    pub fn load(backup_dir: &Path) -> VaultResult<Self> {
        let path = backup_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(VaultError::ChainIntegrity(format!(
                "Manifest missing: {}",
                path.display()
            )));
        }
        read_json_required(&path)
    }

    pub fn save(&self, backup_dir: &Path) -> VaultResult<()> {
        write_json_atomic(backup_dir.join(MANIFEST_FILE), self)
    }

    /// Check every listed artifact exists, is non-empty and matches its digest
    pub fn verify_artifacts(&self, backup_dir: &Path) -> VaultResult<()> {
        if self.checksums.is_empty() {
            return Err(VaultError::ChainIntegrity(format!(
                "Backup {} lists no artifacts",
                self.backup_id
            )));
        }

        for (rel_path, expected) in &self.checksums {
            let path = backup_dir.join(rel_path);
            let metadata = std::fs::metadata(&path).map_err(|_| {
                VaultError::ChainIntegrity(format!(
                    "Backup {} is missing artifact {}",
                    self.backup_id, rel_path
                ))
            })?;
            if metadata.len() == 0 {
                return Err(VaultError::ChainIntegrity(format!(
                    "Backup {} has empty artifact {}",
                    self.backup_id, rel_path
                )));
            }

            let actual = sha256_file(&path)?;
            if &actual != expected {
                return Err(VaultError::ChainIntegrity(format!(
                    "Checksum mismatch for {} in backup {}",
                    rel_path, self.backup_id
                )));
            }
        }
        Ok(())
    }

    /// Check the manifest describes the same backup as the catalog record
    pub fn verify_matches(&self, record: &BackupRecord) -> VaultResult<()> {
        if self.backup_id != record.backup_id
            || self.backup_type != record.backup_type
            || self.parent_backup_id != record.parent_backup_id
            || self.timeline_id != record.timeline_id
            || self.wal_range != record.wal_range
        {
            return Err(VaultError::ChainIntegrity(format!(
                "Manifest of {} does not match its catalog record",
                record.backup_id
            )));
        }
        Ok(())
    }
}

/// Digest every regular file under `backup_dir` except the manifest itself
pub fn collect_checksums(backup_dir: &Path) -> VaultResult<BTreeMap<String, String>> {
    let mut checksums = BTreeMap::new();
    for entry in WalkDir::new(backup_dir) {
        let entry = entry?;
        let is_manifest = entry.depth() == 1 && entry.file_name() == MANIFEST_FILE;
        if !entry.file_type().is_file() || is_manifest {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(backup_dir)
            .map_err(|e| VaultError::Io(e.to_string()))?;
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        checksums.insert(key, sha256_file(entry.path())?);
    }
    Ok(checksums)
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> VaultResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Load and fully verify the manifest of a catalogued backup
pub fn verify_backup(record: &BackupRecord) -> VaultResult<BackupManifest> {
    let backup_dir = record.backup_dir().ok_or_else(|| {
        VaultError::ChainIntegrity(format!("Backup {} has no directory", record.backup_id))
    })?;
    let manifest = BackupManifest::load(backup_dir)?;
    manifest.verify_matches(record)?;
    manifest.verify_artifacts(backup_dir)?;
    Ok(manifest)
}
