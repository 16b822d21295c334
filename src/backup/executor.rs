//! Backup executor
//!
//! Produces FULL and INCREMENTAL backups. Every artifact is written into a
//! fresh `<home>/backups/<id>/` directory, checked, described by a manifest,
//! and only then catalogued. If any step fails the directory is removed and
//! no record is created.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditEntry, Operation};
use crate::config::Layout;
use crate::engine::{wal, Engine};
use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord, BackupType, WalRange};
use crate::storage::Storage;

use super::archive;
use super::changes;
use super::lock::OperationLock;
use super::manifest::BackupManifest;

pub const DATABASE_DIR: &str = "database";
pub const FILES_DIR: &str = "files";
pub const WAL_DIR: &str = "wal";
pub const CONTENT_ARCHIVE: &str = "content.tar.gz";

type Clock<'a> = Box<dyn Fn() -> DateTime<Utc> + 'a>;

/// Creates backups of the live installation
pub struct BackupExecutor<'a> {
    storage: &'a Storage,
    engine: &'a dyn Engine,
    layout: &'a Layout,
    actor: String,
    clock: Clock<'a>,
}

impl<'a> BackupExecutor<'a> {
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
            actor: actor.into(),
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the source of backup start times
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Take a self-contained base backup of the database and the whole
    /// content tree
    #[instrument(skip(self), fields(actor = %self.actor))]
    pub fn run_full(&self) -> VaultResult<BackupRecord> {
        let _lock = OperationLock::acquire(&self.storage.paths().lock_file())?;

        let started_at = (self.clock)();
        let backup_id = BackupId::generate(BackupType::Full, started_at);
        let backup_dir = self.check_unused(&backup_id)?;
        fs::create_dir_all(&backup_dir)?;

        info!(%backup_id, "starting full backup");
        let record = self
            .capture_full(&backup_id, &backup_dir, started_at)
            .map_err(|e| self.discard(&backup_dir, e))?;

        self.audit(&record);
        info!(
            %backup_id,
            wal_range = %record.wal_range,
            size = record.total_size_bytes,
            "full backup complete"
        );
        Ok(record)
    }

    /// Capture WAL and content changes since the latest backup in the
    /// current timeline
    #[instrument(skip(self), fields(actor = %self.actor))]
    pub fn run_incremental(&self) -> VaultResult<BackupRecord> {
        let _lock = OperationLock::acquire(&self.storage.paths().lock_file())?;

        let started_at = (self.clock)();
        let timeline = self.engine.current_timeline()?;
        let parent = self
            .storage
            .catalog
            .latest_in_timeline(timeline)?
            .ok_or(VaultError::NoBaseBackup {
                timeline: timeline.value(),
            })?;

        let backup_id = BackupId::generate(BackupType::Incremental, started_at);
        let backup_dir = self.check_unused(&backup_id)?;

        let current = self.engine.switch_wal()?;
        let parent_end = parent.wal_range.end;
        if current < parent_end {
            return Err(VaultError::Engine(format!(
                "WAL position {} is behind the end of backup {} ({})",
                current, parent.backup_id, parent_end
            )));
        }

        let activity = self.engine.activity_since(parent.created_at)?;
        let changed = changes::changed_since(&self.layout.content_dir, parent.created_at)?;
        debug!(
            %current,
            %parent_end,
            activity,
            changed_files = changed.len(),
            "change detection"
        );

        if current == parent_end && !activity {
            return Err(VaultError::NoChanges {
                parent: parent.backup_id.to_string(),
            });
        }

        fs::create_dir_all(&backup_dir)?;
        info!(%backup_id, parent = %parent.backup_id, "starting incremental backup");

        let plan = IncrementalPlan {
            backup_id: &backup_id,
            parent: &parent,
            wal_range: WalRange::new(parent_end, current),
            changed,
            started_at,
        };
        let record = self
            .capture_incremental(plan, &backup_dir)
            .map_err(|e| self.discard(&backup_dir, e))?;

        self.audit(&record);
        info!(
            %backup_id,
            wal_range = %record.wal_range,
            size = record.total_size_bytes,
            "incremental backup complete"
        );
        Ok(record)
    }

    /// Reject an id already catalogued or already on disk
    fn check_unused(&self, backup_id: &BackupId) -> VaultResult<PathBuf> {
        let backup_dir = self.storage.paths().backup_dir().join(backup_id.as_str());
        if self.storage.catalog.get(backup_id)?.is_some() || backup_dir.exists() {
            return Err(VaultError::DuplicateId(backup_id.to_string()));
        }
        Ok(backup_dir)
    }

    fn capture_full(
        &self,
        backup_id: &BackupId,
        backup_dir: &Path,
        started_at: DateTime<Utc>,
    ) -> VaultResult<BackupRecord> {
        let database_dir = backup_dir.join(DATABASE_DIR);
        let files_dir = backup_dir.join(FILES_DIR);
        fs::create_dir_all(&files_dir)?;

        let base = self.engine.take_base(&database_dir)?;
        if base.files.is_empty() {
            return Err(VaultError::Engine(
                "Physical backup tool produced no files".into(),
            ));
        }

        let content_files = archive::pack_tree(
            &self.layout.content_dir,
            &files_dir.join(CONTENT_ARCHIVE),
        )?;

        let record = BackupRecord {
            backup_id: backup_id.clone(),
            backup_type: BackupType::Full,
            timeline_id: base.timeline,
            parent_backup_id: None,
            wal_range: WalRange::new(base.start_lsn, base.end_lsn),
            database_artifact_location: database_dir,
            content_artifact_location: files_dir,
            total_size_bytes: 0,
            created_at: started_at,
        };

        self.finalize(record, backup_dir, Vec::new(), content_files)
    }

    fn capture_incremental(
        &self,
        plan: IncrementalPlan<'_>,
        backup_dir: &Path,
    ) -> VaultResult<BackupRecord> {
        let database_dir = backup_dir.join(DATABASE_DIR);
        let files_dir = backup_dir.join(FILES_DIR);
        let wal_out = database_dir.join(WAL_DIR);
        fs::create_dir_all(&wal_out)?;
        fs::create_dir_all(&files_dir)?;

        let timeline = plan.parent.timeline_id;
        let segment_size = self.engine.wal_segment_size();
        let mut needed = wal::segments_covering(timeline, plan.wal_range, segment_size);
        if needed.is_empty() {
            // Position unchanged but transactions ran: keep the segment it sits in
            let segno = plan.wal_range.end.segment_number(segment_size);
            needed.push(wal::segment_file_name(timeline, segno, segment_size));
        }
        let available = self.engine.list_wal(&self.layout.wal_dir)?;
        let segments = wal::select_segments(&available, &needed)?;

        for segment in &segments {
            let dest = wal_out.join(format!("{}.gz", segment.name));
            archive::compress_file(&segment.path, &dest)?;
            debug!(segment = %segment.name, bytes = segment.size, "captured WAL segment");
        }

        archive::pack_files(
            &self.layout.content_dir,
            &plan.changed,
            &files_dir.join(CONTENT_ARCHIVE),
        )?;

        let record = BackupRecord {
            backup_id: plan.backup_id.clone(),
            backup_type: BackupType::Incremental,
            timeline_id: timeline,
            parent_backup_id: Some(plan.parent.backup_id.clone()),
            wal_range: plan.wal_range,
            database_artifact_location: database_dir,
            content_artifact_location: files_dir,
            total_size_bytes: 0,
            created_at: plan.started_at,
        };

        let names = segments.into_iter().map(|s| s.name).collect();
        self.finalize(record, backup_dir, names, plan.changed)
    }

    /// Write and check the manifest, size the backup and catalog it
    fn finalize(
        &self,
        mut record: BackupRecord,
        backup_dir: &Path,
        wal_segments: Vec<String>,
        content_files: Vec<PathBuf>,
    ) -> VaultResult<BackupRecord> {
        let manifest = BackupManifest::build(&record, backup_dir, wal_segments, content_files)?;
        manifest.verify_artifacts(backup_dir)?;
        manifest.save(backup_dir)?;

        record.total_size_bytes = archive::tree_size(backup_dir)?;
        self.storage.catalog.create(record.clone())?;
        Ok(record)
    }

    /// Remove a half-written backup directory and hand back the error
    fn discard(&self, backup_dir: &Path, error: VaultError) -> VaultError {
        warn!(dir = %backup_dir.display(), %error, "backup failed, removing partial artifacts");
        if let Err(e) = fs::remove_dir_all(backup_dir) {
            warn!(dir = %backup_dir.display(), error = %e, "failed to remove partial backup");
        }
        error
    }

    fn audit(&self, record: &BackupRecord) {
        let entry = AuditEntry::new(
            Operation::CreateBackup,
            &self.actor,
            record.backup_id.as_str(),
        )
        .with_detail(record.backup_type.to_string());

        if let Err(e) = self.storage.audit.log(&entry) {
            warn!(error = %e, backup_id = %record.backup_id, "failed to write audit entry");
        }
    }
}

struct IncrementalPlan<'p> {
    backup_id: &'p BackupId,
    parent: &'p BackupRecord,
    wal_range: WalRange,
    changed: Vec<PathBuf>,
    started_at: DateTime<Utc>,
}
