//! Audit logging for chainvault
//!
//! Successful backups and restores are recorded in an append-only
//! line-delimited JSON log (`audit.log`) as `(operation, actor, target)`
//! entries. Failures are reported to the caller and to the tracing output
//! but are not audited.

mod entry;
mod logger;

pub use entry::{AuditEntry, Operation};
pub use logger::AuditLogger;
