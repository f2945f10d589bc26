use crate::core::components::{AssetId, ChainId};
use crate::crypto::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain: ChainParams,
    pub storage: StorageConfig,
}

/// Per-chain validation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network_id: u32,
    pub chain_id: ChainId,
    /// Asset in which fees are paid and burned.
    pub fee_asset: AssetId,
    pub tx_fee: u64,
    pub create_asset_fee: u64,
    pub max_memo_size: usize,
    pub max_name_len: usize,
    pub max_symbol_len: usize,
    pub max_denomination: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            network_id: 1,
            chain_id: Hash256::hash(b"X"),
            fee_asset: Hash256::hash(b"AVAX"),
            tx_fee: 1_000_000,
            create_asset_fee: 10_000_000,
            max_memo_size: 256,
            max_name_len: 128,
            max_symbol_len: 4,
            max_denomination: 32,
        }
    }
}

impl ChainParams {
    /// Parameters of another chain on the same network.
    pub fn for_chain(&self, chain_id: ChainId) -> Self {
        Self { chain_id, ..self.clone() }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_dir = PathBuf::from(home_dir).join(".atomic-ledger");

        Self {
            chain: ChainParams::default(),
            storage: StorageConfig { data_dir },
        }
    }
}

impl Config {
    /// Local network: small fees and its own data directory.
    pub fn local() -> Self {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let data_dir = PathBuf::from(home_dir).join(".atomic-ledger-local");

        Self {
            chain: ChainParams {
                network_id: 12345,
                tx_fee: 2,
                create_asset_fee: 10,
                ..ChainParams::default()
            },
            storage: StorageConfig { data_dir },
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Reads the config at `path`, writing the defaults there if it is missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        let home_dir = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home_dir).join(".atomic-ledger").join("config.json")
    }
}

/// Installs the global logger. Safe to call more than once.
pub fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}
