//! Display formatting for terminal output
//!
//! Provides utilities for formatting backups, chains and restore results as
//! plain-text tables and detail views.

pub mod backup;

pub use backup::{
    format_backup_details, format_backup_list, format_chain, format_duration,
    format_restore_summary, format_size,
};
