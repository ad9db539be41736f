//! Consensus engine configuration.

use std::time::Duration;

/// Configuration for the consensus engine.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Admission cap for the leader's vote pool, in bytes of stored
    /// messages.
    pub max_mempool_bytes: u64,

    /// Byte budget handed to the utility layer when reaping
    /// transactions for a proposal.
    pub max_tx_bytes: u64,

    /// Initial per-step timeout. Round `r` times out after
    /// `base · 2^min(r, timeout_max_exponent)`.
    pub pacemaker_base_timeout: Duration,

    /// Cap on the back-off exponent so late rounds stay finite.
    pub timeout_max_exponent: u32,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_mempool_bytes: 4 * 1024 * 1024,
            max_tx_bytes: 90_000,
            pacemaker_base_timeout: Duration::from_millis(500),
            timeout_max_exponent: 6,
        }
    }
}

impl ConsensusConfig {
    pub fn with_pacemaker_base_timeout(mut self, timeout: Duration) -> Self {
        self.pacemaker_base_timeout = timeout;
        self
    }

    pub fn with_max_tx_bytes(mut self, max_tx_bytes: u64) -> Self {
        self.max_tx_bytes = max_tx_bytes;
        self
    }

    pub fn with_max_mempool_bytes(mut self, max_mempool_bytes: u64) -> Self {
        self.max_mempool_bytes = max_mempool_bytes;
        self
    }
}
