//! Filesystem-backed engine double for tests
//!
//! The "database" is the layout's data and WAL directories. A base image is a
//! tarball of the data directory, WAL segments are files the test writes
//! through [`FakeEngine::write_wal`], and the service is a flag. Every
//! capability can be told to fail. Transactions are commit timestamps, so
//! activity is judged against the cutoff the caller passes.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Barrier, Mutex};

use chrono::{DateTime, Utc};

use crate::backup::archive;
use crate::config::Layout;
use crate::error::{VaultError, VaultResult};
use crate::models::{Lsn, TimelineId, WalRange};

use super::wal;
use super::{BaseBackup, EngineControl, PhysicalBackupTool, ServiceStatus, WalControl, WalSegment};

pub(crate) const SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Failure switches; counters fail that many calls and then succeed
#[derive(Debug, Default)]
pub(crate) struct Failures {
    pub take_base: bool,
    pub extract_base: bool,
    pub prepare_recovery: bool,
    pub switch_wal: bool,
    pub stop: bool,
    /// `stop` returns Ok but the service keeps running
    pub stop_ignored: bool,
    pub start: u32,
    pub probe: u32,
}

struct State {
    running: bool,
    timeline: TimelineId,
    lsn: Lsn,
    commits: Vec<DateTime<Utc>>,
    calls: Vec<String>,
}

type Gate = (Arc<Barrier>, Arc<Barrier>);

pub(crate) struct FakeEngine {
    layout: Layout,
    state: Mutex<State>,
    pub failures: Mutex<Failures>,
    stop_gate: Mutex<Option<Gate>>,
}

impl FakeEngine {
    /// A running engine on timeline 1 positioned inside segment 1
    pub fn new(layout: Layout) -> Self {
        fs::create_dir_all(&layout.data_dir).unwrap();
        fs::create_dir_all(&layout.wal_dir).unwrap();
        fs::create_dir_all(&layout.content_dir).unwrap();

        let engine = Self {
            layout,
            state: Mutex::new(State {
                running: true,
                timeline: TimelineId(1),
                lsn: Lsn(SEGMENT_SIZE + 0x28),
                commits: Vec::new(),
                calls: Vec::new(),
            }),
            failures: Mutex::new(Failures::default()),
            stop_gate: Mutex::new(None),
        };
        engine.write_segments(WalRange::new(Lsn(SEGMENT_SIZE), Lsn(SEGMENT_SIZE + 0x28)));
        engine
    }

    /// Advance the WAL position by `bytes`, writing the segment files that
    /// now hold data, and record a transaction committed at `at`
    pub fn write_wal(&self, bytes: u64, at: DateTime<Utc>) {
        let range = {
            let mut state = self.state.lock().unwrap();
            let start = state.lsn;
            state.lsn = Lsn(start.0 + bytes);
            state.commits.push(at);
            WalRange::new(start, state.lsn)
        };
        self.write_segments(range);
    }

    fn write_segments(&self, range: WalRange) {
        let timeline = self.state.lock().unwrap().timeline;
        for name in wal::segments_covering(timeline, range, SEGMENT_SIZE) {
            let path = self.layout.wal_dir.join(&name);
            let mut contents = fs::read(&path).unwrap_or_default();
            contents.extend_from_slice(format!("records up to {}\n", range.end).as_bytes());
            fs::write(path, contents).unwrap();
        }
    }

    /// Record a transaction at `at` that leaves the WAL position alone
    pub fn commit_at(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().commits.push(at);
    }

    pub fn set_timeline(&self, timeline: TimelineId) {
        self.state.lock().unwrap().timeline = timeline;
    }

    pub fn current_lsn(&self) -> Lsn {
        self.state.lock().unwrap().lsn
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Names of the capability calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Make the next `stop` wait on `entered` and then on `release`
    pub fn pause_on_stop(&self, entered: Arc<Barrier>, release: Arc<Barrier>) {
        *self.stop_gate.lock().unwrap() = Some((entered, release));
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_string());
    }
}

impl EngineControl for FakeEngine {
    fn stop(&self) -> VaultResult<()> {
        self.record("stop");
        let gate = self.stop_gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.wait();
            release.wait();
        }

        let failures = self.failures.lock().unwrap();
        if failures.stop {
            return Err(VaultError::ServiceControl("pg_ctl stop failed".into()));
        }
        if !failures.stop_ignored {
            self.state.lock().unwrap().running = false;
        }
        Ok(())
    }

    fn start(&self) -> VaultResult<()> {
        self.record("start");
        let mut failures = self.failures.lock().unwrap();
        if failures.start > 0 {
            failures.start -= 1;
            return Err(VaultError::ServiceControl("pg_ctl start failed".into()));
        }
        self.state.lock().unwrap().running = true;
        Ok(())
    }

    fn status(&self) -> VaultResult<ServiceStatus> {
        Ok(if self.is_running() {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        })
    }

    fn probe(&self) -> VaultResult<()> {
        self.record("probe");
        if !self.is_running() {
            return Err(VaultError::Engine("connection refused".into()));
        }
        let mut failures = self.failures.lock().unwrap();
        if failures.probe > 0 {
            failures.probe -= 1;
            return Err(VaultError::Engine("the database system is starting up".into()));
        }
        Ok(())
    }
}

impl PhysicalBackupTool for FakeEngine {
    fn take_base(&self, dest: &Path) -> VaultResult<BaseBackup> {
        self.record("take_base");
        if self.failures.lock().unwrap().take_base {
            return Err(VaultError::Engine("pg_basebackup failed".into()));
        }

        fs::create_dir_all(dest)?;
        archive::pack_tree(&self.layout.data_dir, &dest.join("base.tar.gz"))?;
        archive::pack_tree(&self.layout.wal_dir, &dest.join("pg_wal.tar.gz"))?;

        let mut state = self.state.lock().unwrap();
        let start_lsn = state.lsn;
        state.lsn = Lsn(start_lsn.0 + 0x100);

        Ok(BaseBackup {
            start_lsn,
            end_lsn: state.lsn,
            timeline: state.timeline,
            files: vec!["base.tar.gz".into(), "pg_wal.tar.gz".into()],
        })
    }

    fn extract_base(&self, artifact_dir: &Path, layout: &Layout) -> VaultResult<()> {
        self.record("extract_base");
        if self.failures.lock().unwrap().extract_base {
            return Err(VaultError::Archive("base image is corrupt".into()));
        }
        archive::unpack(&artifact_dir.join("base.tar.gz"), &layout.data_dir)?;
        archive::unpack(&artifact_dir.join("pg_wal.tar.gz"), &layout.wal_dir)?;
        Ok(())
    }

    fn list_wal(&self, wal_dir: &Path) -> VaultResult<Vec<WalSegment>> {
        wal::scan_wal_dir(wal_dir)
    }

    fn prepare_recovery(&self, layout: &Layout) -> VaultResult<()> {
        self.record("prepare_recovery");
        if self.failures.lock().unwrap().prepare_recovery {
            return Err(VaultError::Io("read-only file system".into()));
        }
        fs::write(layout.data_dir.join("recovery.signal"), "")?;
        Ok(())
    }

    fn wal_segment_size(&self) -> u64 {
        SEGMENT_SIZE
    }
}

impl WalControl for FakeEngine {
    fn current_timeline(&self) -> VaultResult<TimelineId> {
        Ok(self.state.lock().unwrap().timeline)
    }

    fn switch_wal(&self) -> VaultResult<Lsn> {
        self.record("switch_wal");
        if self.failures.lock().unwrap().switch_wal {
            return Err(VaultError::Engine("pg_switch_wal failed".into()));
        }
        Ok(self.current_lsn())
    }

    fn activity_since(&self, since: DateTime<Utc>) -> VaultResult<bool> {
        Ok(self.state.lock().unwrap().commits.iter().any(|at| *at > since))
    }
}
