use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chainvault::cli::{
    engine_for, handle_backup_command, handle_catalog_command, BackupCommands, CatalogCommands,
};
use chainvault::config::{Settings, VaultPaths};
use chainvault::engine::WalControl;
use chainvault::storage::Storage;

#[derive(Parser)]
#[command(
    name = "chainvault",
    author = "Kaylee Beyene",
    version,
    about = "Chained backups and rollback-safe restores for PostgreSQL",
    long_about = "chainvault takes FULL and INCREMENTAL backups of a PostgreSQL \
                  installation and its content directory, chains them per \
                  timeline, and restores any point of a chain with a safety \
                  snapshot that is put back if the restore fails."
)]
struct Cli {
    /// Name recorded in the audit log
    #[arg(long, global = true, env = "CHAINVAULT_ACTOR")]
    actor: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Catalog commands
    #[command(subcommand)]
    Catalog(CatalogCommands),

    /// Show the engine's current timeline and its latest backup
    Timeline,

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Initialize chainvault and record the installation layout
    Init {
        /// Engine data directory
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// WAL directory, if outside the data directory
        #[arg(long)]
        wal_dir: Option<PathBuf>,

        /// Content tree directory
        #[arg(long)]
        content_dir: Option<PathBuf>,

        /// Directory holding pg_ctl, pg_basebackup and psql
        #[arg(long)]
        bin_dir: Option<PathBuf>,
    },

    /// Show current configuration and paths
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("CHAINVAULT_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = VaultPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;
    let storage = Storage::new(paths.clone())?;

    let actor = cli
        .actor
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());

    match cli.command {
        Some(Commands::Backup(cmd)) => {
            handle_backup_command(&storage, &settings, &actor, cmd)?;
        }
        Some(Commands::Catalog(cmd)) => {
            handle_catalog_command(&storage, cmd)?;
        }
        Some(Commands::Timeline) => {
            let engine = engine_for(&storage, &settings)?;
            let timeline = engine.current_timeline()?;
            println!("Current timeline: {}", timeline);
            match storage.catalog.latest_in_timeline(timeline)? {
                Some(record) => println!(
                    "Latest backup:    {} ({}, ends at {})",
                    record.backup_id, record.backup_type, record.wal_range.end
                ),
                None => {
                    println!("Latest backup:    none");
                    println!("An incremental backup needs a full backup in this timeline first.");
                }
            }
        }
        Some(Commands::Audit { limit }) => {
            let entries = storage.audit.read_recent(limit)?;
            if entries.is_empty() {
                println!("No audit entries.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
        Some(Commands::Init {
            data_dir,
            wal_dir,
            content_dir,
            bin_dir,
        }) => {
            println!("Initializing chainvault at: {}", paths.base_dir().display());
            if data_dir.is_some() {
                settings.data_dir = data_dir;
            }
            if wal_dir.is_some() {
                settings.wal_dir = wal_dir;
            }
            if content_dir.is_some() {
                settings.content_dir = content_dir;
            }
            if bin_dir.is_some() {
                settings.engine.bin_dir = bin_dir;
            }
            settings.save(&paths)?;
            println!("Initialization complete!");
            println!();
            println!("Settings written to: {}", paths.settings_file().display());
            if settings.layout().is_err() {
                println!("Set the data and content directories before taking a backup:");
                println!("  chainvault init --data-dir <DIR> --content-dir <DIR>");
            }
        }
        Some(Commands::Config) => {
            println!("chainvault Configuration");
            println!("========================");
            println!("Home directory:     {}", paths.base_dir().display());
            println!("Backup directory:   {}", paths.backup_dir().display());
            println!("Snapshot directory: {}", paths.snapshot_dir().display());
            println!("Catalog:            {}", paths.catalog_file().display());
            println!("Audit log:          {}", paths.audit_log().display());
            println!();
            println!("Installation:");
            match settings.layout() {
                Ok(layout) => {
                    println!("  Data directory:    {}", layout.data_dir.display());
                    println!("  WAL directory:     {}", layout.wal_dir.display());
                    println!("  Content directory: {}", layout.content_dir.display());
                }
                Err(e) => println!("  {}", e),
            }
            println!();
            println!("Engine:");
            println!(
                "  Connection: {}@{}:{}/{}",
                settings.engine.user,
                settings.engine.host,
                settings.engine.port,
                settings.engine.database
            );
            if let Some(bin_dir) = &settings.engine.bin_dir {
                println!("  Binaries:   {}", bin_dir.display());
            }
            println!(
                "  Retries:    stop {} / start {} / probe {}",
                settings.retry.stop_attempts,
                settings.retry.start_attempts,
                settings.retry.probe_attempts
            );
        }
        None => {
            println!("chainvault - chained backups and rollback-safe restores");
            println!();
            println!("Run 'chainvault --help' for usage information.");
        }
    }

    Ok(())
}
