//! JSONL audit trail of backups and restores

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};
use crate::models::BackupId;

use super::entry::AuditEntry;

/// Appends to and reads back `<home>/audit.log`
pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// Append one entry. The line is flushed before returning so a crash
    /// right after a restore still leaves the record behind.
    pub fn log(&self, entry: &AuditEntry) -> VaultResult<()> {
        let line = serde_json::to_string(entry)
            .map_err(|e| VaultError::Json(format!("Failed to serialize audit entry: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;
        writeln!(file, "{}", line)
            .and_then(|()| file.flush())
            .map_err(|e| VaultError::Io(format!("Failed to append to audit log: {}", e)))
    }

    /// Every entry, oldest first; a missing log reads as empty
    pub fn read_all(&self) -> VaultResult<Vec<AuditEntry>> {
        if !self.log_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_path)
            .map_err(|e| VaultError::Io(format!("Failed to open audit log: {}", e)))?;

        let mut entries = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                VaultError::Io(format!("Failed to read audit log line {}: {}", idx + 1, e))
            })?;
            if let Some(entry) = parse_line(&line, idx + 1)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// The last `count` entries, oldest first
    pub fn read_recent(&self, count: usize) -> VaultResult<Vec<AuditEntry>> {
        let mut entries = self.read_all()?;
        let skip = entries.len().saturating_sub(count);
        Ok(entries.split_off(skip))
    }

    /// Entries that created or restored `backup_id`
    pub fn for_backup(&self, backup_id: &BackupId) -> VaultResult<Vec<AuditEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.target_id == backup_id.as_str())
            .collect())
    }
}

fn parse_line(line: &str, line_no: usize) -> VaultResult<Option<AuditEntry>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some).map_err(|e| {
        VaultError::Json(format!(
            "Failed to parse audit entry at line {}: {}",
            line_no, e
        ))
    })
}
