//! MerkleDrop Settings
//!
//! Operator configuration for the MerkleDrop tooling.
//!
//! ## Features
//!
//! - Dataset store location
//! - Local ledger snapshot location
//! - Withdrawal query batching
//! - Allocation exclusions and residual sink
//! - Default log filter
//!
//! ## Usage
//!
//! ```no_run
//! use merkledrop_settings::Settings;
//!
//! // Load or create default settings
//! let mut settings = Settings::load_or_default()?;
//!
//! // Modify settings
//! settings.withdrawal.query_batch_size = 250;
//!
//! // Save settings
//! settings.save()?;
//! # Ok::<(), merkledrop_settings::SettingsError>(())
//! ```

mod config;

pub use config::{
    AllocationSettings, LedgerSettings, LoggingSettings, Settings, StoreSettings,
    WithdrawalSettings,
};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("merkledrop.json")
}
