//! Audit entry data structures
//!
//! One entry is written per successful backup or restore, naming who did it
//! and which backup it concerned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audited operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CreateBackup,
    RestoreBackup,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::CreateBackup => write!(f, "CREATE_BACKUP"),
            Operation::RestoreBackup => write!(f, "RESTORE_BACKUP"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the operation completed (UTC)
    pub timestamp: DateTime<Utc>,

    pub operation: Operation,

    /// Who triggered the operation
    pub actor: String,

    /// Backup id the operation created or restored
    pub target_id: String,

    /// Free-form description, e.g. the backup type or the applied chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(
        operation: Operation,
        actor: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            actor: actor.into(),
            target_id: target_id.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} {} by {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.target_id,
            self.actor
        );

        if let Some(detail) = &self.detail {
            output.push_str(&format!(" ({})", detail));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::CreateBackup.to_string(), "CREATE_BACKUP");
        assert_eq!(Operation::RestoreBackup.to_string(), "RESTORE_BACKUP");
    }

    #[test]
    fn test_serialized_operation_name() {
        let entry = AuditEntry::new(Operation::RestoreBackup, "admin", "BK_FULL_20250101_000000");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"RESTORE_BACKUP\""));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_human_readable_format() {
        let entry = AuditEntry::new(Operation::CreateBackup, "admin", "BK_INCR_20250101_000000")
            .with_detail("INCREMENTAL");

        let formatted = entry.format_human_readable();
        assert!(formatted.contains("CREATE_BACKUP"));
        assert!(formatted.contains("BK_INCR_20250101_000000"));
        assert!(formatted.contains("by admin"));
        assert!(formatted.contains("(INCREMENTAL)"));
    }
}
