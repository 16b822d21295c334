//! Backup CLI commands
//!
//! Implements CLI commands for creating, inspecting and restoring backups.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use crate::backup::{verify_backup, BackupExecutor, BackupManifest, RestoreOrchestrator};
use crate::config::Settings;
use crate::display::{
    format_backup_details, format_backup_list, format_chain, format_restore_summary, format_size,
};
use crate::engine::PgEngine;
use crate::error::{VaultError, VaultResult};
use crate::export::export_bundle;
use crate::models::{BackupId, BackupRecord};
use crate::storage::Storage;

/// Kind of backup to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupKind {
    /// Base image plus the whole content tree
    Full,
    /// WAL and content changes since the latest backup in the timeline
    #[value(alias = "incr")]
    Incremental,
}

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        #[arg(value_enum)]
        kind: BackupKind,
    },

    /// List all catalogued backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup id (use 'latest' for most recent)
        backup: String,
    },

    /// Check a backup's artifacts against its manifest
    Verify {
        /// Backup id (use 'latest' for most recent)
        backup: String,
    },

    /// Show the chain a restore of this backup would apply
    Chain {
        /// Backup id (use 'latest' for most recent)
        backup: String,
    },

    /// Restore the installation to a backup
    Restore {
        /// Backup id (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Pack one backup into <OUTPUT>/<backup_id>.tar.gz
    Export {
        /// Backup id (use 'latest' for most recent)
        backup: String,

        /// Output directory
        output: PathBuf,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    storage: &Storage,
    settings: &Settings,
    actor: &str,
    cmd: BackupCommands,
) -> VaultResult<()> {
    match cmd {
        BackupCommands::Create { kind } => {
            let layout = settings.layout()?;
            let engine = engine_for(storage, settings)?;
            let executor = BackupExecutor::new(storage, &engine, &layout, actor);

            let result = match kind {
                BackupKind::Full => {
                    println!("Creating full backup...");
                    executor.run_full()
                }
                BackupKind::Incremental => {
                    println!("Creating incremental backup...");
                    executor.run_incremental()
                }
            };

            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_expected() => {
                    println!("{}", e);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            println!("Backup created: {}", record.backup_id);
            println!("WAL range: {}", record.wal_range);
            println!("Size: {}", format_size(record.total_size_bytes));
            if let Some(dir) = record.backup_dir() {
                println!("Location: {}", dir.display());
            }
        }

        BackupCommands::List { verbose } => {
            let records = storage.catalog.list()?;

            if records.is_empty() {
                println!("No backups found.");
                println!("Create one with: chainvault backup create full");
                return Ok(());
            }

            if verbose {
                for record in &records {
                    let manifest = record.backup_dir().and_then(|d| BackupManifest::load(d).ok());
                    println!("{}", format_backup_details(record, manifest.as_ref()));
                }
            } else {
                print!("{}", format_backup_list(&records));
            }
        }

        BackupCommands::Info { backup } => {
            let record = resolve_backup(storage, &backup)?;
            let manifest = record.backup_dir().and_then(|d| BackupManifest::load(d).ok());
            print!("{}", format_backup_details(&record, manifest.as_ref()));

            let history = storage.audit.for_backup(&record.backup_id)?;
            if !history.is_empty() {
                println!();
                println!("History:");
                for entry in history {
                    println!("  {}", entry.format_human_readable());
                }
            }
        }

        BackupCommands::Verify { backup } => {
            let record = resolve_backup(storage, &backup)?;
            let manifest = verify_backup(&record)?;
            println!(
                "Backup {} is intact ({} artifacts verified).",
                record.backup_id,
                manifest.checksums.len()
            );
        }

        BackupCommands::Chain { backup } => {
            let record = resolve_backup(storage, &backup)?;
            let chain = storage.catalog.chain_for(&record.backup_id)?;
            let total: u64 = chain.iter().map(|r| r.total_size_bytes).sum();

            println!("Restore chain for {}", record.backup_id);
            println!();
            print!("{}", format_chain(&chain));
            println!();
            println!("{} backup(s), {}", chain.len(), format_size(total));
        }

        BackupCommands::Restore { backup, force } => {
            let record = resolve_backup(storage, &backup)?;
            let chain = storage.catalog.chain_for(&record.backup_id)?;
            let layout = settings.layout()?;

            println!("Restore Plan");
            println!("============");
            print!("{}", format_chain(&chain));
            println!();
            println!("Data directory:    {}", layout.data_dir.display());
            if layout.wal_is_separate() {
                println!("WAL directory:     {}", layout.wal_dir.display());
            }
            println!("Content directory: {}", layout.content_dir.display());
            println!();

            if !force {
                println!("WARNING: This will stop the database and overwrite ALL current data!");
                println!("A safety snapshot is taken first and restored if anything fails.");
                println!("To proceed, run again with --force flag:");
                println!("  chainvault backup restore {} --force", backup);
                return Ok(());
            }

            let engine = engine_for(storage, settings)?;
            println!("Restoring {}...", record.backup_id);
            let summary = RestoreOrchestrator::new(storage, &engine, &layout, actor)
                .with_retry(settings.retry.clone())
                .restore(&record.backup_id)?;

            println!("Restore complete!");
            print!("{}", format_restore_summary(&summary));
        }

        BackupCommands::Export { backup, output } => {
            let record = resolve_backup(storage, &backup)?;
            let bundle = export_bundle(storage, &record.backup_id, &output)?;
            let size = std::fs::metadata(&bundle)?.len();
            println!("Backup exported to: {}", bundle.display());
            println!("Size: {}", format_size(size));
        }
    }

    Ok(())
}

/// Build the PostgreSQL driver from settings
pub fn engine_for(storage: &Storage, settings: &Settings) -> VaultResult<PgEngine> {
    let layout = settings.layout()?;
    Ok(PgEngine::new(settings.engine.clone(), &layout)
        .with_log_file(storage.paths().base_dir().join("postgres.log")))
}

/// Resolve a backup id argument to its catalog record
fn resolve_backup(storage: &Storage, backup: &str) -> VaultResult<BackupRecord> {
    if backup.eq_ignore_ascii_case("latest") {
        return storage
            .catalog
            .list()?
            .into_iter()
            .next()
            .ok_or_else(|| VaultError::backup_not_found("latest"));
    }

    let backup_id = BackupId::parse(backup)?;
    storage
        .catalog
        .get(&backup_id)?
        .ok_or_else(|| VaultError::backup_not_found(backup_id.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::json::tests::{create_test_storage, seed_chain};

    #[test]
    fn test_resolve_latest() {
        let (_temp_dir, storage) = create_test_storage();
        let chain = seed_chain(&storage);

        let latest = resolve_backup(&storage, "LATEST").unwrap();
        assert_eq!(latest.backup_id, chain[1].backup_id);
    }

    #[test]
    fn test_resolve_by_id() {
        let (_temp_dir, storage) = create_test_storage();
        let chain = seed_chain(&storage);

        let found = resolve_backup(&storage, chain[0].backup_id.as_str()).unwrap();
        assert_eq!(found, chain[0]);
    }

    #[test]
    fn test_resolve_errors() {
        let (_temp_dir, storage) = create_test_storage();

        assert!(resolve_backup(&storage, "latest").unwrap_err().is_not_found());
        assert!(resolve_backup(&storage, "BK_FULL_20200101_000000")
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            resolve_backup(&storage, "yesterday"),
            Err(VaultError::Config(_))
        ));
    }
}
