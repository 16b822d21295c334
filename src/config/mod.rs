//! Configuration module for chainvault
//!
//! This module provides configuration management including:
//! - Home directory and on-disk layout resolution
//! - Installation settings persistence
//! - Retry budgets for service control

pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::{EngineSettings, Layout, RetryPolicy, Settings};
