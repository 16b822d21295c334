//! Database engine capabilities
//!
//! The backup core never talks to the database directly. It depends on three
//! narrow capabilities:
//!
//! - [`EngineControl`]: stop, start, query and probe the service
//! - [`PhysicalBackupTool`]: take and extract base images, list WAL segments
//!   and prepare a data directory for recovery
//! - [`WalControl`]: timeline, WAL switch and activity queries
//!
//! [`postgres::PgEngine`] implements all three by running the PostgreSQL
//! client utilities. Tests use an in-memory double that can fail at any step.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::config::Layout;
use crate::error::VaultResult;
use crate::models::{Lsn, TimelineId};

pub mod postgres;
mod process;
pub mod wal;

#[cfg(test)]
pub(crate) mod fake;

pub use postgres::PgEngine;

/// Observed state of the database service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
    /// Neither confirmed running nor confirmed stopped
    Unknown,
}

/// Result of a physical base backup
#[derive(Debug, Clone)]
pub struct BaseBackup {
    /// Position the base image starts from
    pub start_lsn: Lsn,
    /// Position the image is consistent at
    pub end_lsn: Lsn,
    pub timeline: TimelineId,
    /// Files the tool wrote, relative to the destination directory
    pub files: Vec<PathBuf>,
}

/// One WAL segment file in the engine's WAL directory
#[derive(Debug, Clone)]
pub struct WalSegment {
    /// Original file name, e.g. `000000010000000000000003`
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Service lifecycle control
pub trait EngineControl: Send + Sync {
    /// Ask the service to stop
    fn stop(&self) -> VaultResult<()>;

    /// Ask the service to start
    fn start(&self) -> VaultResult<()>;

    fn status(&self) -> VaultResult<ServiceStatus>;

    /// Open a connection and run a trivial query
    fn probe(&self) -> VaultResult<()>;
}

/// The engine's native physical-backup utilities
pub trait PhysicalBackupTool: Send + Sync {
    /// Write a self-consistent base image plus the WAL it needs into `dest`
    fn take_base(&self, dest: &Path) -> VaultResult<BaseBackup>;

    /// Unpack a base image taken by [`take_base`](Self::take_base) into the
    /// live data and WAL directories
    fn extract_base(&self, artifact_dir: &Path, layout: &Layout) -> VaultResult<()>;

    /// WAL segment files currently present in `wal_dir`
    fn list_wal(&self, wal_dir: &Path) -> VaultResult<Vec<WalSegment>>;

    /// Clear stale recovery markers and write the recovery directive and
    /// minimal configuration so the engine replays all available WAL on start
    fn prepare_recovery(&self, layout: &Layout) -> VaultResult<()>;

    /// Size of one WAL segment in bytes
    fn wal_segment_size(&self) -> u64;
}

/// WAL and activity introspection on the running engine
pub trait WalControl: Send + Sync {
    fn current_timeline(&self) -> VaultResult<TimelineId>;

    /// Force the current WAL segment to be closed and return the position
    /// after the switch
    fn switch_wal(&self) -> VaultResult<Lsn>;

    /// Whether any transaction committed or rolled back since `since`
    fn activity_since(&self, since: DateTime<Utc>) -> VaultResult<bool>;
}

/// Everything the backup core needs from an engine
pub trait Engine: EngineControl + PhysicalBackupTool + WalControl {}

impl<T: EngineControl + PhysicalBackupTool + WalControl> Engine for T {}
