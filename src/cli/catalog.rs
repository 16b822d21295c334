//! CLI commands for the backup catalog
//!
//! Exports the catalog listing in JSON, YAML or CSV.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Subcommand;

use crate::error::{VaultError, VaultResult};
use crate::export::{export_catalog, ExportFormat};
use crate::storage::Storage;

/// Catalog subcommands
#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// Export every catalogued backup
    Export {
        /// Export format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Handle catalog commands
pub fn handle_catalog_command(storage: &Storage, cmd: CatalogCommands) -> VaultResult<()> {
    match cmd {
        CatalogCommands::Export { format, output } => match output {
            Some(path) => {
                let file = File::create(&path).map_err(|e| {
                    VaultError::Export(format!("Failed to create file {}: {}", path.display(), e))
                })?;
                let mut writer = BufWriter::new(file);
                export_catalog(storage, format, &mut writer)?;
                writer.flush()?;

                let count = storage.catalog.list()?.len();
                println!("Exported {} backup(s) to: {}", count, path.display());
            }
            None => {
                let stdout = io::stdout();
                let mut writer = stdout.lock();
                export_catalog(storage, format, &mut writer)?;
                writeln!(writer)?;
            }
        },
    }

    Ok(())
}
