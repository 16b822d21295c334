//! Process-wide operation lock
//!
//! Backups and restores serialize on an advisory exclusive lock of
//! `<home>/chainvault.lock`. Acquisition never waits: a held lock is reported
//! as `RestoreInProgress` at once. The lock is released when the guard drops.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{VaultError, VaultResult};

/// Held operation lock; released on drop
#[derive(Debug)]
pub struct OperationLock {
    file: File,
    path: PathBuf,
}

impl OperationLock {
    /// Try to take the lock without blocking
    pub fn acquire(path: &Path) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| VaultError::Io(format!("Failed to open lock file: {}", e)))?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            debug!(path = %path.display(), "operation lock is held elsewhere");
            return Err(VaultError::RestoreInProgress);
        }

        debug!(path = %path.display(), "operation lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperationLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release operation lock");
        }
    }
}
