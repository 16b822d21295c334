//! Backup records
//!
//! A `BackupRecord` describes one completed backup. Records are written once,
//! after every artifact is on disk, and never modified afterwards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BackupId, TimelineId};
use super::lsn::WalRange;
use crate::error::VaultError;

/// Kind of backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackupType {
    /// Self-contained base image plus the whole content tree
    Full,
    /// WAL and content changes since the parent backup
    Incremental,
}

impl BackupType {
    /// Short code used inside backup ids
    pub fn code(&self) -> &'static str {
        match self {
            BackupType::Full => "FULL",
            BackupType::Incremental => "INCR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "FULL" => Some(BackupType::Full),
            "INCR" => Some(BackupType::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupType::Full => write!(f, "FULL"),
            BackupType::Incremental => write!(f, "INCREMENTAL"),
        }
    }
}

impl FromStr for BackupType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(BackupType::Full),
            "incremental" | "incr" => Ok(BackupType::Incremental),
            other => Err(VaultError::Config(format!(
                "Unknown backup type '{}': expected 'full' or 'incremental'",
                other
            ))),
        }
    }
}

/// One backup event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: BackupId,
    pub backup_type: BackupType,
    pub timeline_id: TimelineId,
    /// Immediately preceding backup in the chain; `None` only for FULL
    #[serde(default)]
    pub parent_backup_id: Option<BackupId>,
    pub wal_range: WalRange,
    /// `database/` directory of the backup
    pub database_artifact_location: PathBuf,
    /// `files/` directory of the backup
    pub content_artifact_location: PathBuf,
    pub total_size_bytes: u64,
    /// When the backup started
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    pub fn is_full(&self) -> bool {
        self.backup_type == BackupType::Full
    }

    /// Directory holding all of this backup's artifacts
    pub fn backup_dir(&self) -> Option<&std::path::Path> {
        self.database_artifact_location.parent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_type_parse() {
        assert_eq!("full".parse::<BackupType>().unwrap(), BackupType::Full);
        assert_eq!(
            "INCREMENTAL".parse::<BackupType>().unwrap(),
            BackupType::Incremental
        );
        assert_eq!("incr".parse::<BackupType>().unwrap(), BackupType::Incremental);
        assert!("differential".parse::<BackupType>().is_err());
    }

    #[test]
    fn test_backup_type_codes() {
        assert_eq!(BackupType::Full.code(), "FULL");
        assert_eq!(BackupType::Incremental.code(), "INCR");
        assert_eq!(BackupType::from_code("INCR"), Some(BackupType::Incremental));
        assert_eq!(BackupType::from_code("INCREMENTAL"), None);
    }

    #[test]
    fn test_serialized_type_names() {
        let json = serde_json::to_string(&BackupType::Incremental).unwrap();
        assert_eq!(json, "\"INCREMENTAL\"");
    }
}
