//! Identifier types for backups and engine timelines
//!
//! Backup ids are derived from the backup type and the UTC creation time with
//! second granularity, e.g. `BK_FULL_20250114_093015`. Two requests within the
//! same second produce the same id; the catalog rejects the second one.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::BackupType;
use crate::error::VaultError;

const ID_PREFIX: &str = "BK_";
const ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Unique identifier of a backup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupId(String);

impl BackupId {
    /// Derive the id for a backup of `backup_type` started at `at`
    pub fn generate(backup_type: BackupType, at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}{}_{}",
            ID_PREFIX,
            backup_type.code(),
            at.format(ID_TIME_FORMAT)
        ))
    }

    /// Parse and validate an id string
    pub fn parse(s: &str) -> Result<Self, VaultError> {
        let id = Self(s.trim().to_string());
        id.components().ok_or_else(|| {
            VaultError::Config(format!(
                "Invalid backup id '{}': expected BK_FULL_YYYYMMDD_HHMMSS or BK_INCR_YYYYMMDD_HHMMSS",
                s
            ))
        })?;
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backup type encoded in the id
    pub fn backup_type(&self) -> Option<BackupType> {
        self.components().map(|(t, _)| t)
    }

    /// Creation timestamp encoded in the id
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.components().map(|(_, ts)| ts)
    }

    fn components(&self) -> Option<(BackupType, DateTime<Utc>)> {
        let rest = self.0.strip_prefix(ID_PREFIX)?;
        let (code, time_part) = rest.split_once('_')?;
        let backup_type = BackupType::from_code(code)?;
        let naive = NaiveDateTime::parse_from_str(time_part, ID_TIME_FORMAT).ok()?;
        Some((backup_type, DateTime::from_naive_utc_and_offset(naive, Utc)))
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BackupId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for BackupId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// WAL history lineage the engine was on when a backup was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimelineId(pub u32);

impl TimelineId {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
