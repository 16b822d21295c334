//! Restore orchestration
//!
//! Replays a backup chain onto the live installation. The sequence is:
//!
//! 1. take the operation lock
//! 2. resolve the chain and verify every member's manifest and checksums
//! 3. snapshot the data directory, WAL directory and content tree
//! 4. stop the service and wait until it is confirmed stopped
//! 5. wipe the live state (point of no return)
//! 6. extract the FULL backup, then apply each INCREMENTAL in order
//! 7. write the recovery directive
//! 8. start the service and probe it
//!
//! A failure or cancel before step 5 discards the snapshot and restarts the
//! service if it was already stopped. Any failure after step 5 copies the
//! snapshot back and restarts the service. If that fails too the snapshot is
//! left in place and the error is fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, Operation};
use crate::config::{Layout, RetryPolicy};
use crate::engine::{Engine, ServiceStatus};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord};
use crate::storage::Storage;

use super::archive;
use super::executor::{CONTENT_ARCHIVE, WAL_DIR};
use super::lock::OperationLock;
use super::manifest::{self, BackupManifest};
use super::session::{RestorePhase, RestoreSession};

/// Outcome of a successful restore
#[derive(Debug, Clone)]
pub struct RestoreSummary {
    pub session_id: Uuid,
    pub target: BackupId,
    /// Applied backups, root first
    pub chain: Vec<BackupId>,
    pub phases: Vec<RestorePhase>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RestoreSummary {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Drives restores against the live installation
pub struct RestoreOrchestrator<'a> {
    storage: &'a Storage,
    engine: &'a dyn Engine,
    layout: &'a Layout,
    retry: RetryPolicy,
    actor: String,
    cancel: Arc<AtomicBool>,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        storage: &'a Storage,
        engine: &'a dyn Engine,
        layout: &'a Layout,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            engine,
            layout,
            retry: RetryPolicy::default(),
            actor: actor.into(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share a flag that aborts the restore while it is still reversible
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Restore the installation to the state captured by `backup_id`
    #[instrument(skip(self, backup_id), fields(target = %backup_id, actor = %self.actor))]
    pub fn restore(&self, backup_id: &BackupId) -> VaultResult<RestoreSummary> {
        let started_at = Utc::now();
        let mut session = RestoreSession::new(backup_id.clone());

        let _lock = OperationLock::acquire(&self.storage.paths().lock_file())?;
        session.advance(RestorePhase::Locked)?;
        info!(session = %session.session_id, "restore started");

        if let Err(cause) = self.run(&mut session) {
            return Err(if session.past_point_of_no_return() {
                self.roll_back(&mut session, cause)
            } else {
                self.abort(&session, cause)
            });
        }

        session.advance(RestorePhase::Verified)?;
        if let Some(snapshot) = &session.snapshot {
            self.discard_snapshot(snapshot);
        }
        self.audit(&session);
        info!(session = %session.session_id, "restore verified");

        Ok(RestoreSummary {
            session_id: session.session_id,
            target: session.target.clone(),
            chain: session.chain_ids().into_iter().cloned().collect(),
            phases: session.phases(),
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Everything between taking the lock and a verified service
    fn run(&self, session: &mut RestoreSession) -> VaultResult<()> {
        session.chain = self.storage.catalog.chain_for(&session.target)?;
        let manifests = session
            .chain
            .iter()
            .map(manifest::verify_backup)
            .collect::<VaultResult<Vec<_>>>()?;
        info!(chain = ?session.chain_ids(), "chain verified");
        self.check_cancelled()?;

        session.advance(RestorePhase::Snapshotting)?;
        session.snapshot = Some(self.take_snapshot(session)?);
        self.check_cancelled()?;

        self.stop_service()?;
        session.advance(RestorePhase::ServiceStopped)?;
        self.check_cancelled()?;

        self.apply_chain(session, &manifests)
    }

    /// Give up before the wipe. The live data was never touched, so only the
    /// service and the snapshot need putting back.
    fn abort(&self, session: &RestoreSession, cause: VaultError) -> VaultError {
        warn!(error = %cause, phase = %session.phase(), "restore aborted; live data untouched");
        if let Some(snapshot) = &session.snapshot {
            self.discard_snapshot(snapshot);
        }
        if session.phase() != RestorePhase::ServiceStopped {
            return cause;
        }

        match self.start_service() {
            Ok(()) => cause,
            Err(restart_error) => {
                error!(error = %restart_error, "service left stopped after aborted restore");
                VaultError::ServiceControl(format!(
                    "Restore aborted ({}) and the stopped service could not be restarted: {}",
                    cause, restart_error
                ))
            }
        }
    }

    fn check_cancelled(&self) -> VaultResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(VaultError::Cancelled(
                "restore cancelled before any data was changed".into(),
            ));
        }
        Ok(())
    }

    /// Copy the live state into a fresh directory under the snapshot root
    fn take_snapshot(&self, session: &RestoreSession) -> VaultResult<PathBuf> {
        let name = format!(
            "{}_{}_{}",
            session.target,
            Utc::now().format("%Y%m%d_%H%M%S"),
            session.session_id.simple()
        );
        let snapshot = self.storage.paths().snapshot_dir().join(name);
        info!(snapshot = %snapshot.display(), "taking safety snapshot");

        let result = (|| {
            fs::create_dir_all(&snapshot)?;
            snapshot_dir(&self.layout.data_dir, &snapshot.join("data"))?;
            if self.layout.wal_is_separate() {
                snapshot_dir(&self.layout.wal_dir, &snapshot.join("wal"))?;
            }
            snapshot_dir(&self.layout.content_dir, &snapshot.join("content"))
        })();

        match result {
            Ok(()) => Ok(snapshot),
            Err(e) => {
                self.discard_snapshot(&snapshot);
                Err(e)
            }
        }
    }

    /// Wipe the live state and replay the chain onto it
    fn apply_chain(
        &self,
        session: &mut RestoreSession,
        manifests: &[BackupManifest],
    ) -> VaultResult<()> {
        session.advance(RestorePhase::DataWiped)?;
        self.wipe_live_state()?;

        let (base, increments) = session
            .chain
            .split_first()
            .ok_or_else(|| VaultError::ChainIntegrity("Empty restore chain".into()))?;

        info!(backup_id = %base.backup_id, "extracting base backup");
        self.engine
            .extract_base(&base.database_artifact_location, self.layout)?;
        self.apply_content(base)?;

        fs::create_dir_all(&self.layout.wal_dir)?;
        for (record, manifest) in increments.iter().zip(manifests.iter().skip(1)) {
            info!(
                backup_id = %record.backup_id,
                segments = manifest.wal_segments.len(),
                files = manifest.content_files.len(),
                "applying incremental backup"
            );
            let wal_src = record.database_artifact_location.join(WAL_DIR);
            for name in &manifest.wal_segments {
                archive::decompress_file(
                    &wal_src.join(format!("{}.gz", name)),
                    &self.layout.wal_dir.join(name),
                )?;
            }
            self.apply_content(record)?;
        }

        self.engine.prepare_recovery(self.layout)?;
        session.advance(RestorePhase::ArtifactsApplied)?;

        session.advance(RestorePhase::ServiceStarting)?;
        self.start_service()?;
        self.probe_service()
    }

    fn apply_content(&self, record: &BackupRecord) -> VaultResult<()> {
        archive::unpack(
            &record.content_artifact_location.join(CONTENT_ARCHIVE),
            &self.layout.content_dir,
        )
    }

    fn wipe_live_state(&self) -> VaultResult<()> {
        warn!(data_dir = %self.layout.data_dir.display(), "wiping live state");
        archive::clear_dir(&self.layout.data_dir)?;
        if self.layout.wal_is_separate() {
            archive::clear_dir(&self.layout.wal_dir)?;
        }
        archive::clear_dir(&self.layout.content_dir)
    }

    /// Put the snapshot back and bring the service up on it
    fn roll_back(&self, session: &mut RestoreSession, cause: VaultError) -> VaultError {
        error!(error = %cause, phase = %session.phase(), "restore failed, rolling back");
        if let Err(e) = session.advance(RestorePhase::RollingBack) {
            warn!(error = %e, "unexpected phase during rollback");
        }
        let Some(saved) = session.snapshot.clone() else {
            let _ = session.advance(RestorePhase::Unrecoverable);
            return VaultError::UnrecoverableRestore {
                target: session.target.to_string(),
                snapshot: PathBuf::new(),
                rollback_error: "no safety snapshot was taken".into(),
                cause: Box::new(cause),
            };
        };
        let snapshot = saved.as_path();

        match self.restore_snapshot(snapshot) {
            Ok(()) => {
                let _ = session.advance(RestorePhase::RolledBack);
                self.discard_snapshot(snapshot);
                info!("rollback complete; original state restored");
                VaultError::RestoreFailedRolledBack {
                    target: session.target.to_string(),
                    cause: Box::new(cause),
                }
            }
            Err(rollback_error) => {
                let _ = session.advance(RestorePhase::Unrecoverable);
                error!(
                    snapshot = %snapshot.display(),
                    error = %rollback_error,
                    "rollback failed; manual intervention required"
                );
                VaultError::UnrecoverableRestore {
                    target: session.target.to_string(),
                    snapshot: snapshot.to_path_buf(),
                    rollback_error: rollback_error.to_string(),
                    cause: Box::new(cause),
                }
            }
        }
    }

    fn restore_snapshot(&self, snapshot: &Path) -> VaultResult<()> {
        if let Err(e) = self.engine.stop() {
            warn!(error = %e, "stop before rollback failed; continuing");
        }

        archive::clear_dir(&self.layout.data_dir)?;
        archive::copy_tree(&snapshot.join("data"), &self.layout.data_dir)?;
        if self.layout.wal_is_separate() {
            archive::clear_dir(&self.layout.wal_dir)?;
            archive::copy_tree(&snapshot.join("wal"), &self.layout.wal_dir)?;
        }
        archive::clear_dir(&self.layout.content_dir)?;
        archive::copy_tree(&snapshot.join("content"), &self.layout.content_dir)?;

        self.start_service()?;
        self.probe_service()
    }

    fn stop_service(&self) -> VaultResult<()> {
        self.engine.stop().map_err(|e| match e {
            VaultError::ServiceControl(_) => e,
            other => VaultError::ServiceControl(other.to_string()),
        })?;

        let attempts = self.retry.stop_attempts.max(1);
        for attempt in 1..=attempts {
            if self.engine.status()? == ServiceStatus::Stopped {
                info!(attempt, "service stopped");
                return Ok(());
            }
            pause(attempt, attempts, self.retry.stop_delay());
        }

        Err(VaultError::ServiceControl(format!(
            "Service did not stop after {} status checks",
            attempts
        )))
    }

    fn start_service(&self) -> VaultResult<()> {
        let attempts = self.retry.start_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.engine.start() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, error = %e, "service start failed");
                    last_error = e.to_string();
                }
            }
            pause(attempt, attempts, self.retry.start_delay());
        }

        Err(VaultError::ServiceControl(format!(
            "Service did not start after {} attempts: {}",
            attempts, last_error
        )))
    }

    fn probe_service(&self) -> VaultResult<()> {
        let attempts = self.retry.probe_attempts.max(1);
        for attempt in 1..=attempts {
            match self.engine.probe() {
                Ok(()) => {
                    info!(attempt, "database accepting connections");
                    return Ok(());
                }
                Err(e) => warn!(attempt, error = %e, "connectivity probe failed"),
            }
            pause(attempt, attempts, self.retry.probe_delay());
        }
        Err(VaultError::ConnectivityTimeout { attempts })
    }

    fn discard_snapshot(&self, snapshot: &Path) {
        if snapshot.exists() {
            if let Err(e) = fs::remove_dir_all(snapshot) {
                warn!(snapshot = %snapshot.display(), error = %e, "failed to remove snapshot");
            }
        }
    }

    fn audit(&self, session: &RestoreSession) {
        let chain = session
            .chain_ids()
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ");
        let entry = AuditEntry::new(Operation::RestoreBackup, &self.actor, session.target.as_str())
            .with_detail(chain);

        if let Err(e) = self.storage.audit.log(&entry) {
            warn!(error = %e, "failed to write audit entry");
        }
    }
}

/// Copy a live directory into the snapshot; a missing directory snapshots
/// as empty
fn snapshot_dir(src: &Path, dest: &Path) -> VaultResult<()> {
    if src.exists() {
        archive::copy_tree(src, dest)
    } else {
        fs::create_dir_all(dest)?;
        Ok(())
    }
}

fn pause(attempt: u32, attempts: u32, delay: Duration) {
    if attempt < attempts && !delay.is_zero() {
        thread::sleep(delay);
    }
}
