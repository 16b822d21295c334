//! PostgreSQL driver
//!
//! Shells out to `pg_ctl`, `pg_basebackup` and `psql`. The base image is taken
//! in tar format with streamed WAL (`-Ft -z -Xs`), which leaves
//! `base.tar.gz`, `pg_wal.tar.gz` and `backup_manifest` in the destination.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::backup::archive;
use crate::config::{EngineSettings, Layout};
use crate::error::{VaultError, VaultResult};
use crate::models::{Lsn, TimelineId};

use super::process::Tool;
use super::wal;
use super::{BaseBackup, EngineControl, PhysicalBackupTool, ServiceStatus, WalControl, WalSegment};

const BASE_ARCHIVE: &str = "base.tar.gz";
const WAL_ARCHIVE: &str = "pg_wal.tar.gz";
const TOOL_MANIFEST: &str = "backup_manifest";

/// `pg_ctl status` exit code for "no server running"
const PG_CTL_NOT_RUNNING: i32 = 3;

/// Markers that must not survive into a restored data directory
const STALE_MARKERS: &[&str] = &["postmaster.pid", "postmaster.opts", "standby.signal"];

/// Engine implementation for a local PostgreSQL cluster
pub struct PgEngine {
    settings: EngineSettings,
    data_dir: PathBuf,
    log_file: Option<PathBuf>,
}

impl PgEngine {
    pub fn new(settings: EngineSettings, layout: &Layout) -> Self {
        Self {
            settings,
            data_dir: layout.data_dir.clone(),
            log_file: None,
        }
    }

    /// Server log used by `pg_ctl start`
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    fn tool(&self, name: &str) -> Tool {
        let password = std::env::var(&self.settings.password_env).ok();
        Tool::new(self.settings.bin_dir.as_ref(), name).with_password(password)
    }

    fn data_dir_arg(&self) -> String {
        self.data_dir.display().to_string()
    }

    /// Run one SQL statement and return the single unaligned result value
    fn query(&self, sql: &str) -> VaultResult<String> {
        let port = self.settings.port.to_string();
        let output = self.tool("psql").run(&[
            "-X",
            "-w",
            "-h",
            &self.settings.host,
            "-p",
            &port,
            "-U",
            &self.settings.user,
            "-d",
            &self.settings.database,
            "-tA",
            "-c",
            sql,
        ])?;
        Ok(output.trim().to_string())
    }
}

impl EngineControl for PgEngine {
    fn stop(&self) -> VaultResult<()> {
        info!(data_dir = %self.data_dir.display(), "stopping database service");
        let data_dir = self.data_dir_arg();
        self.tool("pg_ctl")
            .run(&["stop", "-D", &data_dir, "-m", "fast", "-w"])
            .map_err(|e| VaultError::ServiceControl(e.to_string()))?;
        Ok(())
    }

    fn start(&self) -> VaultResult<()> {
        info!(data_dir = %self.data_dir.display(), "starting database service");
        let data_dir = self.data_dir_arg();
        let log_file = self.log_file.as_ref().map(|p| p.display().to_string());

        let mut args = vec!["start", "-D", data_dir.as_str(), "-w"];
        if let Some(log) = &log_file {
            args.push("-l");
            args.push(log.as_str());
        }

        self.tool("pg_ctl")
            .run(&args)
            .map_err(|e| VaultError::ServiceControl(e.to_string()))?;
        Ok(())
    }

    fn status(&self) -> VaultResult<ServiceStatus> {
        let data_dir = self.data_dir_arg();
        let output = self.tool("pg_ctl").output(&["status", "-D", &data_dir])?;

        let status = match output.code {
            Some(0) => ServiceStatus::Running,
            Some(PG_CTL_NOT_RUNNING) => ServiceStatus::Stopped,
            _ => ServiceStatus::Unknown,
        };
        debug!(?status, "service status");
        Ok(status)
    }

    fn probe(&self) -> VaultResult<()> {
        let result = self.query("SELECT 1")?;
        if result == "1" {
            Ok(())
        } else {
            Err(VaultError::Engine(format!(
                "Unexpected probe result '{}'",
                result
            )))
        }
    }
}

impl PhysicalBackupTool for PgEngine {
    fn take_base(&self, dest: &Path) -> VaultResult<BaseBackup> {
        fs::create_dir_all(dest)?;

        let dest_arg = dest.display().to_string();
        let port = self.settings.port.to_string();
        self.tool("pg_basebackup").run(&[
            "-D",
            &dest_arg,
            "-Ft",
            "-z",
            "-Xs",
            "-w",
            "-h",
            &self.settings.host,
            "-p",
            &port,
            "-U",
            &self.settings.user,
        ])?;

        let manifest_path = dest.join(TOOL_MANIFEST);
        let contents = fs::read_to_string(&manifest_path).map_err(|e| {
            VaultError::Engine(format!(
                "pg_basebackup did not write {}: {}",
                TOOL_MANIFEST, e
            ))
        })?;
        let (timeline, start_lsn, end_lsn) = parse_wal_range(&contents)?;

        let mut files = Vec::new();
        for entry in fs::read_dir(dest)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(PathBuf::from(entry.file_name()));
            }
        }
        files.sort();

        info!(%start_lsn, %end_lsn, %timeline, "base backup taken");

        Ok(BaseBackup {
            start_lsn,
            end_lsn,
            timeline,
            files,
        })
    }

    fn extract_base(&self, artifact_dir: &Path, layout: &Layout) -> VaultResult<()> {
        let base = artifact_dir.join(BASE_ARCHIVE);
        if !base.exists() {
            return Err(VaultError::ChainIntegrity(format!(
                "Base image missing: {}",
                base.display()
            )));
        }
        archive::unpack(&base, &layout.data_dir)?;
        if layout.wal_is_separate() {
            link_wal_dir(layout)?;
        }

        let wal = artifact_dir.join(WAL_ARCHIVE);
        if wal.exists() {
            archive::unpack(&wal, &layout.wal_dir)?;
        }
        Ok(())
    }

    fn list_wal(&self, wal_dir: &Path) -> VaultResult<Vec<WalSegment>> {
        wal::scan_wal_dir(wal_dir)
    }

    fn prepare_recovery(&self, layout: &Layout) -> VaultResult<()> {
        for marker in STALE_MARKERS {
            let path = layout.data_dir.join(marker);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        fs::write(layout.data_dir.join("recovery.signal"), "")?;

        let auto_conf = layout.data_dir.join("postgresql.auto.conf");
        let mut conf = fs::read_to_string(&auto_conf).unwrap_or_default();
        conf.push_str(&recovery_settings(&layout.wal_dir));
        fs::write(&auto_conf, conf)?;

        restrict_permissions(&layout.data_dir)?;
        Ok(())
    }

    fn wal_segment_size(&self) -> u64 {
        self.settings.wal_segment_size
    }
}

impl WalControl for PgEngine {
    fn current_timeline(&self) -> VaultResult<TimelineId> {
        let value = self.query("SELECT timeline_id FROM pg_control_checkpoint()")?;
        value
            .parse::<u32>()
            .map(TimelineId)
            .map_err(|_| VaultError::Engine(format!("Unexpected timeline id '{}'", value)))
    }

    fn switch_wal(&self) -> VaultResult<Lsn> {
        self.query("SELECT pg_switch_wal()")?;
        self.query("SELECT pg_current_wal_lsn()")?.parse()
    }

    fn activity_since(&self, since: DateTime<Utc>) -> VaultResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM pg_stat_database \
             WHERE xact_commit + xact_rollback > 0 \
             AND stats_reset > '{}'::timestamptz)",
            since.to_rfc3339()
        );
        match self.query(&sql)?.as_str() {
            "t" => Ok(true),
            "f" => Ok(false),
            other => Err(VaultError::Engine(format!(
                "Unexpected activity query result '{}'",
                other
            ))),
        }
    }
}

/// Settings appended to `postgresql.auto.conf` so the server replays every
/// segment in the WAL directory and follows the latest timeline
fn recovery_settings(wal_dir: &Path) -> String {
    format!(
        "\n# added by chainvault restore\n\
         restore_command = 'cp \"{}/%f\" \"%p\"'\n\
         recovery_target_timeline = 'latest'\n",
        wal_dir.display()
    )
}

/// Read the timeline and WAL window from a `backup_manifest`
fn parse_wal_range(manifest: &str) -> VaultResult<(TimelineId, Lsn, Lsn)> {
    let json: Value = serde_json::from_str(manifest)
        .map_err(|e| VaultError::Engine(format!("Unreadable backup_manifest: {}", e)))?;

    let range = json
        .get("WAL-Ranges")
        .and_then(|r| r.as_array())
        .and_then(|r| r.last())
        .ok_or_else(|| VaultError::Engine("backup_manifest has no WAL-Ranges".into()))?;

    let timeline = range
        .get("Timeline")
        .and_then(|t| t.as_u64())
        .ok_or_else(|| VaultError::Engine("backup_manifest WAL range has no Timeline".into()))?;
    let start = range
        .get("Start-LSN")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VaultError::Engine("backup_manifest WAL range has no Start-LSN".into()))?;
    let end = range
        .get("End-LSN")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VaultError::Engine("backup_manifest WAL range has no End-LSN".into()))?;

    Ok((TimelineId(timeline as u32), start.parse()?, end.parse()?))
}

#[cfg(unix)]
fn restrict_permissions(data_dir: &Path) -> VaultResult<()> {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(data_dir).follow_links(false) {
        let entry = entry?;
        let mode = if entry.file_type().is_dir() {
            0o700
        } else if entry.file_type().is_file() {
            0o600
        } else {
            continue;
        };
        fs::set_permissions(entry.path(), fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_data_dir: &Path) -> VaultResult<()> {
    Ok(())
}

/// Point `<data>/pg_wal` at the external WAL directory
///
/// The base tarball carries `pg_wal` as an empty directory, which would hide
/// the separately stored segments from the server.
#[cfg(unix)]
fn link_wal_dir(layout: &Layout) -> VaultResult<()> {
    let pg_wal = layout.data_dir.join("pg_wal");
    match fs::symlink_metadata(&pg_wal) {
        Ok(meta) if meta.file_type().is_symlink() => return Ok(()),
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&pg_wal)?,
        Ok(_) => fs::remove_file(&pg_wal)?,
        Err(_) => {}
    }
    fs::create_dir_all(&layout.wal_dir)?;
    std::os::unix::fs::symlink(&layout.wal_dir, &pg_wal)?;
    debug!(link = %pg_wal.display(), target = %layout.wal_dir.display(), "linked WAL directory");
    Ok(())
}

#[cfg(not(unix))]
fn link_wal_dir(_layout: &Layout) -> VaultResult<()> {
    Ok(())
}
