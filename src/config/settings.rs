//! Installation settings for chainvault
//!
//! Describes the live installation (data directory, WAL directory, content
//! tree), how to reach the database engine, and the retry budgets used while
//! stopping, starting and probing the service.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::error::VaultError;

/// Connection and tooling settings for the database engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Directory holding `pg_ctl`, `pg_basebackup` and `psql`; `None` uses `PATH`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<PathBuf>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Name of the environment variable holding the database password.
    /// The password itself is never written to the settings file.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// WAL segment size in bytes
    #[serde(default = "default_wal_segment_size")]
    pub wal_segment_size: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_password_env() -> String {
    "CHAINVAULT_DB_PASSWORD".to_string()
}

fn default_wal_segment_size() -> u64 {
    16 * 1024 * 1024
}

const MIN_WAL_SEGMENT_SIZE: u64 = 1024 * 1024;
const MAX_WAL_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bin_dir: None,
            host: default_host(),
            port: default_port(),
            user: default_user(),
            database: default_database(),
            password_env: default_password_env(),
            wal_segment_size: default_wal_segment_size(),
        }
    }
}

impl EngineSettings {
    /// Reject settings the WAL arithmetic cannot work with
    pub fn validate(&self) -> Result<(), VaultError> {
        let size = self.wal_segment_size;
        let in_range = (MIN_WAL_SEGMENT_SIZE..=MAX_WAL_SEGMENT_SIZE).contains(&size);
        if !size.is_power_of_two() || !in_range {
            return Err(VaultError::Config(format!(
                "wal_segment_size must be a power of two between 1 MiB and 1 GiB, got {}",
                size
            )));
        }
        Ok(())
    }
}

/// Fixed retry budgets for the blocking waits of a restore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Status polls after a stop before giving up
    pub stop_attempts: u32,
    pub stop_delay_ms: u64,
    /// Start attempts before giving up
    pub start_attempts: u32,
    pub start_delay_ms: u64,
    /// Connectivity probes before declaring a timeout
    pub probe_attempts: u32,
    pub probe_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            stop_attempts: 6,
            stop_delay_ms: 5_000,
            start_attempts: 3,
            start_delay_ms: 5_000,
            probe_attempts: 5,
            probe_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// A policy with no delays, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            stop_delay_ms: 0,
            start_delay_ms: 0,
            probe_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }
}

/// Locations of the live installation's mutable state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Engine data directory (PGDATA)
    pub data_dir: PathBuf,
    /// Engine WAL directory; usually inside `data_dir`
    pub wal_dir: PathBuf,
    /// Content tree backed up alongside the database
    pub content_dir: PathBuf,
}

impl Layout {
    pub fn new(data_dir: PathBuf, wal_dir: Option<PathBuf>, content_dir: PathBuf) -> Self {
        let wal_dir = wal_dir.unwrap_or_else(|| data_dir.join("pg_wal"));
        Self {
            data_dir,
            wal_dir,
            content_dir,
        }
    }

    /// Whether the WAL directory must be snapshotted and wiped on its own
    pub fn wal_is_separate(&self) -> bool {
        !self.wal_dir.starts_with(&self.data_dir)
    }
}

/// Settings for chainvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Engine data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// WAL directory override (defaults to `<data_dir>/pg_wal`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wal_dir: Option<PathBuf>,

    /// Content tree directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            data_dir: None,
            wal_dir: None,
            content_dir: None,
            engine: EngineSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> Result<Self, VaultError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                VaultError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> Result<(), VaultError> {
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| VaultError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Resolve the installation layout, failing if a required directory is
    /// not configured or the engine settings are unusable
    pub fn layout(&self) -> Result<Layout, VaultError> {
        self.engine.validate()?;
        let data_dir = self
            .data_dir
            .clone()
            .ok_or_else(|| VaultError::Config("data_dir is not configured".into()))?;
        let content_dir = self
            .content_dir
            .clone()
            .ok_or_else(|| VaultError::Config("content_dir is not configured".into()))?;

        Ok(Layout::new(data_dir, self.wal_dir.clone(), content_dir))
    }
}
