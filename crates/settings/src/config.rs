//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use merkledrop_core::Address;

use crate::{default_settings_path, Result, SettingsError};

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Where published datasets are kept
    #[serde(default)]
    pub store: StoreSettings,

    /// Local ledger snapshot
    #[serde(default)]
    pub ledger: LedgerSettings,

    /// Withdrawal settings
    #[serde(default)]
    pub withdrawal: WithdrawalSettings,

    /// Allocation settings
    #[serde(default)]
    pub allocation: AllocationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            ledger: LedgerSettings::default(),
            withdrawal: WithdrawalSettings::default(),
            allocation: AllocationSettings::default(),
            logging: LoggingSettings::default(),
            config_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let settings: Settings =
                serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            info!("Loaded settings from {:?}", path);
            settings
        } else {
            Self::default()
        };
        settings.validate()?;
        settings.config_path = Some(path.clone());
        Ok(settings)
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Reject values no component can run with.
    pub fn validate(&self) -> Result<()> {
        if self.withdrawal.query_batch_size == 0 {
            return Err(SettingsError::Invalid {
                field: "withdrawal.query_batch_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(sink) = &self.allocation.residual_sink {
            if self.allocation.exclude.contains(sink) {
                return Err(SettingsError::Invalid {
                    field: "allocation.residual_sink",
                    reason: format!("{sink} is also excluded"),
                });
            }
        }
        Ok(())
    }
}

/// Dataset store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Directory holding `<pointer>.json` datasets
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/datasets")
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

/// Local ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Snapshot file the local ledger is persisted to after every transition
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/ledger.json")
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalSettings {
    /// Claimed-amount lookups issued concurrently per batch
    #[serde(default = "default_query_batch_size")]
    pub query_batch_size: usize,
}

fn default_query_batch_size() -> usize {
    100
}

impl Default for WithdrawalSettings {
    fn default() -> Self {
        Self {
            query_batch_size: default_query_batch_size(),
        }
    }
}

/// Allocation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Addresses removed from every balance source
    #[serde(default)]
    pub exclude: Vec<Address>,

    /// Recipient of rounding residuals; discarded when unset
    #[serde(default)]
    pub residual_sink: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter, overridden by `RUST_LOG`
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}
