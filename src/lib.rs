//! chainvault - chained backups and rollback-safe restores
//!
//! This library provides the core of a backup and restore orchestrator for a
//! PostgreSQL installation and an associated content directory. It takes
//! FULL and INCREMENTAL backups, links them into per-timeline chains, and
//! replays a chain onto the live installation behind a safety snapshot.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Home directory, installation layout and settings
//! - `error`: Custom error types
//! - `models`: Backup ids, WAL positions and backup records
//! - `storage`: Backup catalog and JSON file helpers
//! - `audit`: Audit logging of successful backups and restores
//! - `engine`: Database capabilities and the PostgreSQL driver
//! - `backup`: Change detection, backup executor and restore orchestrator
//! - `export`: Catalog export and backup bundles
//! - `display`: Terminal formatting
//! - `cli`: Command handlers
//!
//! # Example
//!
//! ```rust,ignore
//! use chainvault::backup::BackupExecutor;
//! use chainvault::config::{Settings, VaultPaths};
//! use chainvault::engine::PgEngine;
//! use chainvault::storage::Storage;
//!
//! let paths = VaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let storage = Storage::new(paths)?;
//! let layout = settings.layout()?;
//! let engine = PgEngine::new(settings.engine.clone(), &layout);
//!
//! let record = BackupExecutor::new(&storage, &engine, &layout, "ops").run_full()?;
//! ```

pub mod audit;
pub mod backup;
pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod export;
pub mod models;
pub mod storage;

pub use error::{VaultError, VaultResult};
