//! Deterministic simulation of a consensus cluster.
//!
//! Wires a set of [`meridian_bft::ConsensusState`] machines to a
//! simulated network and a virtual clock. Events are processed in
//! deterministic order: given the same seed, a run produces identical
//! results every time, which makes protocol scenarios (leader crashes,
//! Byzantine votes, partitions) reproducible assertions instead of
//! flakes.

mod event_queue;
mod network;
mod runner;

pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationConfig, SimulationRunner, SimulationStats};

/// Index type for simulation-only node routing. The protocol itself
/// identifies validators by id and address.
pub type NodeIndex = usize;
