//! Prometheus metrics for the runner.

use prometheus::{IntCounter, IntGauge, Registry};

/// Counters and gauges the runner maintains around the engine.
///
/// The height counter increments only on Decide success; everything
/// else is dispatch-boundary accounting.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Blocks committed by this node.
    pub blocks_committed: IntCounter,
    /// Latest committed height.
    pub committed_height: IntGauge,
    /// Consensus messages handed to the dispatcher.
    pub messages_received: IntCounter,
    /// Consensus messages sent or broadcast.
    pub messages_sent: IntCounter,
    /// Outbound sends that reported failure.
    pub send_failures: IntCounter,
}

impl Metrics {
    /// Create and register the metric family in `registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks_committed = IntCounter::new(
            "consensus_blocks_committed_total",
            "Blocks committed by this node",
        )?;
        let committed_height =
            IntGauge::new("consensus_committed_height", "Latest committed height")?;
        let messages_received = IntCounter::new(
            "consensus_messages_received_total",
            "Consensus messages handed to the dispatcher",
        )?;
        let messages_sent = IntCounter::new(
            "consensus_messages_sent_total",
            "Consensus messages sent or broadcast",
        )?;
        let send_failures = IntCounter::new(
            "consensus_send_failures_total",
            "Outbound sends that reported failure",
        )?;

        registry.register(Box::new(blocks_committed.clone()))?;
        registry.register(Box::new(committed_height.clone()))?;
        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(send_failures.clone()))?;

        Ok(Self {
            blocks_committed,
            committed_height,
            messages_received,
            messages_sent,
            send_failures,
        })
    }
}
