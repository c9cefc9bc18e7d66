use crate::amount::Value;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
}

/// How the wallet engine restores history for a new adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Fast,
    Slow,
    New,
}

/// Size model, in bytes, used to turn a fee rate into a fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeeWeights {
    pub base: u64,
    pub per_input: u64,
    pub per_output: u64,
    pub per_plugin: u64,
}

impl FeeWeights {
    /// P2PKH sizes: 10 bytes of version/locktime/counters, 148 per signed
    /// input and 34 per output.
    pub const P2PKH: FeeWeights = FeeWeights {
        base: 10,
        per_input: 148,
        per_output: 34,
        per_plugin: 0,
    };
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainParams {
    pub network: Network,
    /// Fractional digits of the user-facing unit.
    pub decimals: u32,
    pub dust_threshold: Value,
    pub fee_rate: i64,
    pub fee_weights: FeeWeights,
    pub pubkey_address_prefix: u8,
    pub script_address_prefix: u8,
    pub supported_plugins: Vec<u8>,
    /// Confirmations after which an output counts towards the confirmed
    /// balance.
    pub confirmations_threshold: u32,
    /// Confirmations an output needs before it can be spent.
    pub min_spend_confirmations: u32,
}

impl ChainParams {
    pub fn dash(network: Network) -> Self {
        let (pubkey_address_prefix, script_address_prefix) = match network {
            Network::Mainnet => (76, 16),
            Network::Testnet => (140, 19),
        };
        Self {
            network,
            decimals: 8,
            dust_threshold: Value::new(546),
            fee_rate: 1,
            fee_weights: FeeWeights::P2PKH,
            pubkey_address_prefix,
            script_address_prefix,
            supported_plugins: vec![],
            confirmations_threshold: 3,
            min_spend_confirmations: 0,
        }
    }
}

/// Adapter settings as read from a YAML file. Everything except the network
/// falls back to the chain defaults.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    pub network: Network,
    pub sync_mode: Option<SyncMode>,
    #[serde(default)]
    pub fee_rate: Option<i64>,
    #[serde(default)]
    pub dust_threshold: Option<Value>,
    #[serde(default)]
    pub fee_weights: Option<FeeWeights>,
    #[serde(default)]
    pub supported_plugins: Option<Vec<u8>>,
    #[serde(default)]
    pub min_spend_confirmations: Option<u32>,
}

impl AdapterConfig {
    pub fn new(network: Network, sync_mode: SyncMode) -> Self {
        Self {
            network,
            sync_mode: Some(sync_mode),
            fee_rate: None,
            dust_threshold: None,
            fee_weights: None,
            supported_plugins: None,
            min_spend_confirmations: None,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot read config file {path}", path = path.display()))?;
        let config: AdapterConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file {path}", path = path.display()))?;
        Ok(config)
    }

    pub fn chain_params(&self) -> ChainParams {
        let mut params = ChainParams::dash(self.network);
        if let Some(fee_rate) = self.fee_rate {
            params.fee_rate = fee_rate;
        }
        if let Some(dust) = self.dust_threshold {
            params.dust_threshold = dust;
        }
        if let Some(weights) = self.fee_weights {
            params.fee_weights = weights;
        }
        if let Some(plugins) = &self.supported_plugins {
            params.supported_plugins = plugins.clone();
        }
        if let Some(confirmations) = self.min_spend_confirmations {
            params.min_spend_confirmations = confirmations;
        }
        params
    }
}
