//! Backup and restore core
//!
//! Provides FULL and INCREMENTAL backups of a database plus its content
//! tree, and destructive restores with a safety snapshot and rollback.
//!
//! # Architecture
//!
//! - `BackupExecutor`: captures artifacts and catalogs them
//! - `RestoreOrchestrator`: replays a chain onto the live installation
//! - `RestoreSession`: the phase state machine of one restore
//! - `BackupManifest`: per-backup description with artifact checksums
//! - `OperationLock`: serializes backups and restores across processes
//!
//! # Backup Format
//!
//! Each backup lives in `<home>/backups/<backup_id>/`:
//! - `database/`: the base image (FULL) or gzipped WAL segments under
//!   `wal/` (INCREMENTAL)
//! - `files/content.tar.gz`: the whole content tree (FULL) or the files
//!   changed since the parent (INCREMENTAL)
//! - `manifest.json`: ids, WAL range, captured names and SHA-256 checksums
//!
//! # Example
//!
//! ```rust,ignore
//! use chainvault::backup::{BackupExecutor, RestoreOrchestrator};
//!
//! let full = BackupExecutor::new(&storage, &engine, &layout, "ops").run_full()?;
//! let incr = BackupExecutor::new(&storage, &engine, &layout, "ops").run_incremental()?;
//!
//! let summary = RestoreOrchestrator::new(&storage, &engine, &layout, "ops")
//!     .with_retry(settings.retry.clone())
//!     .restore(&incr.backup_id)?;
//! ```

pub mod archive;
pub mod changes;
pub(crate) mod executor;
mod lock;
mod manifest;
mod restore;
mod session;

pub use executor::BackupExecutor;
pub use lock::OperationLock;
pub use manifest::{verify_backup, BackupManifest, MANIFEST_FILE};
pub use restore::{RestoreOrchestrator, RestoreSummary};
pub use session::{PhaseChange, RestorePhase, RestoreSession};
