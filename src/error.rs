//! Custom error types for chainvault
//!
//! This module defines the error hierarchy for the backup and restore core
//! using thiserror. Every failure a caller can observe is one of these kinds;
//! nothing is swallowed or reported as a bare string.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for chainvault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Catalog persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Archive creation or extraction errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// An external engine utility failed or returned something unusable
    #[error("Engine error: {0}")]
    Engine(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// A backup with this id is already catalogued or on disk
    #[error("Backup already exists: {0}")]
    DuplicateId(String),

    /// An incremental backup was requested with no base in the timeline
    #[error("No base backup exists in timeline {timeline}; create a full backup first")]
    NoBaseBackup { timeline: u32 },

    /// Nothing changed since the parent backup
    #[error("No changes detected since backup {parent}")]
    NoChanges { parent: String },

    /// Parent pointers or artifacts do not form a valid chain
    #[error("Chain integrity error: {0}")]
    ChainIntegrity(String),

    /// Another backup or restore holds the operation lock
    #[error("Another backup or restore operation is in progress")]
    RestoreInProgress,

    /// The service could not be stopped or started
    #[error("Service control error: {0}")]
    ServiceControl(String),

    /// The service never answered a connectivity probe
    #[error("Database did not accept connections after {attempts} attempts")]
    ConnectivityTimeout { attempts: u32 },

    /// Restore failed after the point of no return and the original state
    /// was put back
    #[error("Restore of {target} failed and was rolled back: {cause}")]
    RestoreFailedRolledBack {
        target: String,
        #[source]
        cause: Box<VaultError>,
    },

    /// Restore failed and rollback failed too. Operator intervention needed.
    #[error(
        "Restore of {target} failed and rollback also failed ({rollback_error}); \
         original state preserved at {}: {cause}",
        snapshot.display()
    )]
    UnrecoverableRestore {
        target: String,
        snapshot: PathBuf,
        rollback_error: String,
        #[source]
        cause: Box<VaultError>,
    },

    /// A restore session was asked to make a transition it does not allow
    #[error("Illegal restore transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    /// The caller cancelled before the point of no return
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),
}

impl VaultError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Conditions a caller is expected to handle, not bugs
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::NoChanges { .. } | Self::NoBaseBackup { .. })
    }

    /// Errors that must not be retried automatically
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnrecoverableRestore { .. })
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<walkdir::Error> for VaultError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for chainvault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = VaultError::backup_not_found("BK_FULL_20250101_000000");
        assert_eq!(err.to_string(), "Backup not found: BK_FULL_20250101_000000");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_expected_conditions() {
        assert!(VaultError::NoBaseBackup { timeline: 1 }.is_expected());
        assert!(VaultError::NoChanges {
            parent: "BK_FULL_20250101_000000".into()
        }
        .is_expected());
        assert!(!VaultError::RestoreInProgress.is_expected());
    }

    #[test]
    fn test_rolled_back_keeps_cause() {
        use std::error::Error;

        let err = VaultError::RestoreFailedRolledBack {
            target: "BK_FULL_20250101_000000".into(),
            cause: Box::new(VaultError::ConnectivityTimeout { attempts: 5 }),
        };
        assert!(err.to_string().contains("rolled back"));
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("5 attempts"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unrecoverable_is_fatal() {
        let err = VaultError::UnrecoverableRestore {
            target: "BK_INCR_20250101_000000".into(),
            snapshot: PathBuf::from("/tmp/snap"),
            rollback_error: "service would not start".into(),
            cause: Box::new(VaultError::ServiceControl("start failed".into())),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/tmp/snap"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let vault_err: VaultError = io_err.into();
        assert!(matches!(vault_err, VaultError::Io(_)));
    }
}
