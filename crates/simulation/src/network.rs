//! Simulated network with deterministic latency, packet loss, and
//! partitions.

use crate::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way message latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this
    /// probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Deterministic message delivery conditions.
///
/// Partitions are directional: blocking (a, b) drops messages from `a`
/// to `b` only. Block both directions for a full partition.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            partitions: HashSet::new(),
        }
    }

    /// Block messages from `from` to `to`.
    pub fn partition(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.insert((from, to));
    }

    /// Restore messages from `from` to `to`.
    pub fn heal(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.remove(&(from, to));
    }

    /// Whether a message on this edge is dropped right now.
    pub fn should_drop(&self, from: NodeIndex, to: NodeIndex, rng: &mut ChaCha8Rng) -> bool {
        if self.partitions.contains(&(from, to)) {
            return true;
        }
        self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate
    }

    /// Delivery delay for one message, with deterministic jitter.
    pub fn delay(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        let jitter = base * self.config.jitter_fraction * rng.gen::<f64>();
        Duration::from_secs_f64(base + jitter)
    }
}
