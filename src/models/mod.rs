//! Core data models for chainvault
//!
//! - `ids`: backup and timeline identifiers
//! - `lsn`: write-ahead-log positions and ranges
//! - `record`: catalogued backup records

pub mod ids;
pub mod lsn;
pub mod record;

pub use ids::{BackupId, TimelineId};
pub use lsn::{Lsn, WalRange};
pub use record::{BackupRecord, BackupType};
