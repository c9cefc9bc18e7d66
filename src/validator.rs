use crate::config::ChainParams;
use crate::error::SendError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Chain-specific payload attached to a send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum PluginData {
    /// Locks the destination output for the given number of seconds.
    TimeLock { lock_time_interval: u32 },
    Raw { id: u8, payload: Vec<u8> },
}

impl PluginData {
    pub const TIME_LOCK_ID: u8 = 0;

    pub fn id(&self) -> u8 {
        match self {
            PluginData::TimeLock { .. } => Self::TIME_LOCK_ID,
            PluginData::Raw { id, .. } => *id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    PubKeyHash,
    ScriptHash,
}

pub trait AddressValidator: Send + Sync {
    fn validate(&self, address: &str, plugin_data: &[PluginData]) -> Result<(), SendError>;
}

/// Base58check P2PKH/P2SH validation against the configured network.
#[derive(Clone, Debug)]
pub struct Base58AddressValidator {
    pubkey_prefix: u8,
    script_prefix: u8,
    supported_plugins: Vec<u8>,
}

impl Base58AddressValidator {
    const PAYLOAD_LEN: usize = 21;

    pub fn new(params: &ChainParams) -> Self {
        Self {
            pubkey_prefix: params.pubkey_address_prefix,
            script_prefix: params.script_address_prefix,
            supported_plugins: params.supported_plugins.clone(),
        }
    }

    pub fn address_type(&self, address: &str) -> Result<AddressType, SendError> {
        if address.is_empty() {
            return Err(SendError::invalid_address(address, "empty address"));
        }

        let decoded = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|err| SendError::invalid_address(address, err.to_string()))?;
        if decoded.len() != Self::PAYLOAD_LEN {
            return Err(SendError::invalid_address(
                address,
                format!("payload length {} instead of {}", decoded.len(), Self::PAYLOAD_LEN),
            ));
        }

        match decoded[0] {
            prefix if prefix == self.pubkey_prefix => Ok(AddressType::PubKeyHash),
            prefix if prefix == self.script_prefix => Ok(AddressType::ScriptHash),
            prefix => Err(SendError::invalid_address(
                address,
                format!("version byte {prefix} belongs to another network"),
            )),
        }
    }

    fn validate_plugins(&self, plugin_data: &[PluginData]) -> Result<(), SendError> {
        if let Some(plugin) = plugin_data
            .iter()
            .find(|plugin| !self.supported_plugins.contains(&plugin.id()))
        {
            return Err(SendError::UnsupportedPluginData {
                plugin_id: plugin.id(),
            });
        }
        if let Some(duplicate) = plugin_data.iter().map(PluginData::id).duplicates().next() {
            return Err(SendError::UnsupportedPluginData {
                plugin_id: duplicate,
            });
        }
        Ok(())
    }
}

impl AddressValidator for Base58AddressValidator {
    fn validate(&self, address: &str, plugin_data: &[PluginData]) -> Result<(), SendError> {
        self.address_type(address)?;
        self.validate_plugins(plugin_data)
    }
}
