//! Vault configuration
//!
//! Loaded from `<data_dir>/config.json` when present. Command-line flags
//! override individual fields after loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::keychain::DEFAULT_GAP_LIMIT;
use crate::params::{Network, NetworkParams, DEFAULT_FEE_PER_KB};
use crate::storage::StorageConfig;
use crate::transaction::FeeRate;

pub const CONFIG_FILE: &str = "config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for one vault data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub data_dir: PathBuf,
    pub network: Network,
    pub records_file: String,
    /// Fee rate in smallest units per kB
    pub fee_per_kb: u64,
    pub gap_limit: u32,
    pub max_backups: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".doge_vault"),
            network: Network::Mainnet,
            records_file: "records.json".to_string(),
            fee_per_kb: DEFAULT_FEE_PER_KB,
            gap_limit: DEFAULT_GAP_LIMIT,
            max_backups: 5,
        }
    }
}

impl VaultConfig {
    /// Load the config for `data_dir`, falling back to defaults
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let config: VaultConfig = serde_json::from_str(&text)?;
            log::debug!("Loaded config from {}", path.display());
            config
        } else {
            VaultConfig::default()
        };
        // the directory the file was found in wins over its contents
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.data_dir)?;
        fs::write(
            self.data_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(self)?,
        )?;
        Ok(())
    }

    pub fn params(&self) -> NetworkParams {
        NetworkParams {
            default_fee_per_kb: self.fee_per_kb,
            ..NetworkParams::for_network(self.network)
        }
    }

    pub fn fee_rate(&self) -> FeeRate {
        FeeRate::per_kb(self.fee_per_kb)
    }

    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            data_dir: self.data_dir.clone(),
            records_file: self.records_file.clone(),
            backup_enabled: self.max_backups > 0,
            max_backups: self.max_backups,
        }
    }
}
