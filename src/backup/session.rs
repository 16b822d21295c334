//! Restore session state
//!
//! A [`RestoreSession`] tracks one restore attempt through its phases. The
//! session only accepts the transitions listed in
//! [`RestorePhase::can_transition_to`]; anything else is a bug in the caller
//! and is reported as an error rather than silently applied.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::models::{BackupId, BackupRecord};

/// Phase of a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestorePhase {
    Idle,
    Locked,
    Snapshotting,
    ServiceStopped,
    DataWiped,
    ArtifactsApplied,
    ServiceStarting,
    Verified,
    RollingBack,
    RolledBack,
    Unrecoverable,
}

impl RestorePhase {
    pub fn can_transition_to(self, next: RestorePhase) -> bool {
        use RestorePhase::*;

        match (self, next) {
            (Idle, Locked)
            | (Locked, Snapshotting)
            | (Snapshotting, ServiceStopped)
            | (ServiceStopped, DataWiped)
            | (DataWiped, ArtifactsApplied)
            | (ArtifactsApplied, ServiceStarting)
            | (ServiceStarting, Verified)
            | (RollingBack, RolledBack)
            | (RollingBack, Unrecoverable) => true,
            (DataWiped | ArtifactsApplied | ServiceStarting, RollingBack) => true,
            _ => false,
        }
    }

    /// Whether the live installation may have been modified
    pub fn past_point_of_no_return(self) -> bool {
        !matches!(
            self,
            RestorePhase::Idle
                | RestorePhase::Locked
                | RestorePhase::Snapshotting
                | RestorePhase::ServiceStopped
        )
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestorePhase::Idle => "idle",
            RestorePhase::Locked => "locked",
            RestorePhase::Snapshotting => "snapshotting",
            RestorePhase::ServiceStopped => "service stopped",
            RestorePhase::DataWiped => "data wiped",
            RestorePhase::ArtifactsApplied => "artifacts applied",
            RestorePhase::ServiceStarting => "service starting",
            RestorePhase::Verified => "verified",
            RestorePhase::RollingBack => "rolling back",
            RestorePhase::RolledBack => "rolled back",
            RestorePhase::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

/// One recorded phase change
#[derive(Debug, Clone)]
pub struct PhaseChange {
    pub phase: RestorePhase,
    pub at: DateTime<Utc>,
}

/// In-memory state of one restore
#[derive(Debug, Clone)]
pub struct RestoreSession {
    pub session_id: Uuid,
    pub target: BackupId,
    pub chain: Vec<BackupRecord>,
    pub snapshot: Option<PathBuf>,
    phase: RestorePhase,
    history: Vec<PhaseChange>,
}

impl RestoreSession {
    pub fn new(target: BackupId) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            target,
            chain: Vec::new(),
            snapshot: None,
            phase: RestorePhase::Idle,
            history: vec![PhaseChange {
                phase: RestorePhase::Idle,
                at: Utc::now(),
            }],
        }
    }

    pub fn phase(&self) -> RestorePhase {
        self.phase
    }

    /// Every phase entered so far, oldest first
    pub fn phases(&self) -> Vec<RestorePhase> {
        self.history.iter().map(|c| c.phase).collect()
    }

    pub fn past_point_of_no_return(&self) -> bool {
        self.phase.past_point_of_no_return()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: RestorePhase) -> VaultResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(VaultError::IllegalTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(
            session = %self.session_id,
            from = %self.phase,
            to = %next,
            "restore phase"
        );
        self.phase = next;
        self.history.push(PhaseChange {
            phase: next,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Ids of the chain members, root first
    pub fn chain_ids(&self) -> Vec<&BackupId> {
        self.chain.iter().map(|r| &r.backup_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupType;

    fn session() -> RestoreSession {
        RestoreSession::new(BackupId::generate(BackupType::Full, Utc::now()))
    }

    #[test]
    fn test_happy_path() {
        let mut s = session();
        for phase in [
            RestorePhase::Locked,
            RestorePhase::Snapshotting,
            RestorePhase::ServiceStopped,
            RestorePhase::DataWiped,
            RestorePhase::ArtifactsApplied,
            RestorePhase::ServiceStarting,
            RestorePhase::Verified,
        ] {
            s.advance(phase).unwrap();
        }
        assert_eq!(s.phase(), RestorePhase::Verified);
        assert_eq!(s.phases().len(), 8);
    }

    #[test]
    fn test_cannot_skip_phases() {
        let mut s = session();
        assert!(s.advance(RestorePhase::DataWiped).is_err());
        assert_eq!(s.phase(), RestorePhase::Idle);
    }

    #[test]
    fn test_rollback_only_after_point_of_no_return() {
        assert!(!RestorePhase::ServiceStopped.can_transition_to(RestorePhase::RollingBack));
        assert!(RestorePhase::DataWiped.can_transition_to(RestorePhase::RollingBack));
        assert!(RestorePhase::ServiceStarting.can_transition_to(RestorePhase::RollingBack));
        assert!(!RestorePhase::Verified.can_transition_to(RestorePhase::RollingBack));
    }

    #[test]
    fn test_rollback_outcomes() {
        assert!(RestorePhase::RollingBack.can_transition_to(RestorePhase::RolledBack));
        assert!(RestorePhase::RollingBack.can_transition_to(RestorePhase::Unrecoverable));
        assert!(!RestorePhase::RolledBack.can_transition_to(RestorePhase::Verified));
    }

    #[test]
    fn test_point_of_no_return() {
        let mut s = session();
        s.advance(RestorePhase::Locked).unwrap();
        s.advance(RestorePhase::Snapshotting).unwrap();
        s.advance(RestorePhase::ServiceStopped).unwrap();
        assert!(!s.past_point_of_no_return());
        s.advance(RestorePhase::DataWiped).unwrap();
        assert!(s.past_point_of_no_return());
    }
}
