//! Node configuration.
//!
//! [`NodeConfig`] carries defaults for every field, so an empty file (or no
//! file) is a valid configuration. [`NodeConfig::load`] layers an optional
//! TOML file and then `NOTARY__`-prefixed environment variables on top of
//! those defaults, e.g. `NOTARY__ANCHOR__FEE_SAT=20000`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use notary_anchor::{parse_network, AnchorConfig};
use serde::Deserialize;

use crate::error::NodeError;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "NOTARY";

/// Configuration for a notary node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "notary_store=debug").
    pub log_level: String,
    /// Log output format, "text" or "json".
    pub log_format: String,
    /// Network identifier written into directory block headers.
    pub network_id: u32,
    pub anchor: AnchorSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notary");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            network_id: 0,
            anchor: AnchorSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults, then `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, NodeError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize::<NodeConfig>())
            .map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Path to the RocksDB directory-block database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("dirblocks")
    }

    /// Default path of the JSON-lines export.
    pub fn export_path(&self) -> PathBuf {
        self.data_dir.join("export").join("dirblocks.jsonl")
    }
}

/// Bitcoin wallet and anchoring policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnchorSettings {
    /// Anchor sealed directory blocks into Bitcoin.
    pub enabled: bool,
    pub rpc_url: String,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    /// Passphrase of an encrypted wallet. Unset for unencrypted wallets.
    pub wallet_passphrase: Option<String>,
    /// Wallet address that funds anchors and receives change.
    pub address: String,
    /// Bitcoin network name: bitcoin, testnet, signet, or regtest.
    pub network: String,
    /// Fixed fee per anchoring transaction, in satoshis.
    pub fee_sat: u64,
    pub min_confirmations: u32,
    pub max_confirmations: u32,
    /// Confirmations after which reconciliation marks an anchor confirmed.
    pub required_confirmations: u32,
    /// How long the wallet stays unlocked after `walletpassphrase`.
    pub unlock_timeout_secs: u64,
    /// Bound applied by callers that anchor with a timeout.
    pub timeout_secs: u64,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "http://127.0.0.1:18332".to_string(),
            rpc_user: None,
            rpc_password: None,
            wallet_passphrase: None,
            address: String::new(),
            network: "testnet".to_string(),
            fee_sat: 10_000,
            min_confirmations: 0,
            max_confirmations: 999_999,
            required_confirmations: 6,
            unlock_timeout_secs: 2,
            timeout_secs: 120,
        }
    }
}

impl AnchorSettings {
    /// Validated builder configuration.
    pub fn anchor_config(&self) -> Result<AnchorConfig, NodeError> {
        if self.address.is_empty() {
            return Err(NodeError::Config("anchor.address is required".into()));
        }
        let network = parse_network(&self.network)?;
        Ok(AnchorConfig::new(
            &self.address,
            network,
            self.fee_sat,
            self.min_confirmations,
            self.max_confirmations,
        )?)
    }
}
