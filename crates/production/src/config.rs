//! Node-level configuration.

use meridian_bft::ConsensusConfig;
use meridian_types::{KeyError, KeyPair};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid private key: {0}")]
    PrivateKey(#[from] KeyError),
}

/// Deserializable node configuration.
///
/// The recognized options mirror the engine's needs: the validator key,
/// the validator-to-endpoint map for the transport layer, and the
/// engine's tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Hex-encoded 32-byte seed for the validator key.
    pub private_key: String,

    /// Validator address (hex) to transport endpoint.
    #[serde(default)]
    pub peers: HashMap<String, String>,

    /// Admission cap for the leader's vote pool.
    #[serde(default = "defaults::max_mempool_bytes")]
    pub max_mempool_bytes: u64,

    /// Proposal size cap handed to the utility layer.
    #[serde(default = "defaults::max_tx_bytes")]
    pub max_tx_bytes: u64,

    /// Initial step timeout in milliseconds.
    #[serde(default = "defaults::pacemaker_base_timeout_ms")]
    pub pacemaker_base_timeout_ms: u64,
}

mod defaults {
    pub fn max_mempool_bytes() -> u64 {
        4 * 1024 * 1024
    }

    pub fn max_tx_bytes() -> u64 {
        90_000
    }

    pub fn pacemaker_base_timeout_ms() -> u64 {
        500
    }
}

impl NodeConfig {
    /// The validator keypair configured for this node.
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        Ok(KeyPair::from_hex(&self.private_key)?)
    }

    /// Engine configuration derived from the node options.
    pub fn consensus(&self) -> ConsensusConfig {
        ConsensusConfig::default()
            .with_max_mempool_bytes(self.max_mempool_bytes)
            .with_max_tx_bytes(self.max_tx_bytes)
            .with_pacemaker_base_timeout(Duration::from_millis(self.pacemaker_base_timeout_ms))
    }
}
