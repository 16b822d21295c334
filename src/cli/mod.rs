//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup core.

pub mod backup;
pub mod catalog;

pub use backup::{engine_for, handle_backup_command, BackupCommands, BackupKind};
pub use catalog::{handle_catalog_command, CatalogCommands};
