//! Deterministic simulation runner.
//!
//! Processes events in deterministic order and executes actions. Given
//! the same seed, produces identical results every run. Each node has
//! its own in-memory utility layer; they are separate validators that
//! share nothing but the wire.

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::NodeIndex;
use meridian_bft::testonly::{cluster_keys, MockUtility, SharedLedger};
use meridian_bft::{ConsensusConfig, ConsensusState, RoundRobinElection};
use meridian_core::{Action, Event, StateMachine, TimerId};
use meridian_messages::HotstuffMessage;
use meridian_types::{Address, Block, KeyPair};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Configuration for a simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of validators in the cluster.
    pub num_validators: u8,
    /// Random seed for network conditions.
    pub seed: u64,
    /// Network simulation configuration.
    pub network: NetworkConfig,
    /// Engine configuration applied to every node.
    pub consensus: ConsensusConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_validators: 4,
            seed: 42,
            network: NetworkConfig::default(),
            consensus: ConsensusConfig::default(),
        }
    }
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Messages scheduled for delivery.
    pub messages_sent: u64,
    /// Messages dropped by partition or packet loss.
    pub messages_dropped: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
    /// Blocks committed across all nodes.
    pub blocks_committed: u64,
}

/// Deterministic multi-node consensus simulation.
pub struct SimulationRunner {
    nodes: Vec<ConsensusState>,
    ledgers: Vec<SharedLedger>,
    keys: Vec<KeyPair>,
    address_to_node: HashMap<Address, NodeIndex>,
    event_queue: BTreeMap<EventKey, (NodeIndex, Event)>,
    sequence: u64,
    now: Duration,
    network: SimulatedNetwork,
    rng: ChaCha8Rng,
    /// The single pacemaker timer per node, keyed for replacement.
    timers: HashMap<NodeIndex, EventKey>,
    crashed: HashSet<NodeIndex>,
    stats: SimulationStats,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig) -> Self {
        let (keys, validators) = cluster_keys(config.num_validators);
        let mut nodes = Vec::new();
        let mut ledgers = Vec::new();
        for key in &keys {
            let ledger = SharedLedger::default();
            let node = ConsensusState::new(
                key.clone(),
                validators.clone(),
                Box::new(MockUtility::new(ledger.clone())),
                Box::new(RoundRobinElection::new(&validators)),
                config.consensus.clone(),
            )
            .expect("cluster keys are in the validator set");
            nodes.push(node);
            ledgers.push(ledger);
        }

        let address_to_node = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.address(), i))
            .collect();

        Self {
            nodes,
            ledgers,
            keys,
            address_to_node,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: SimulatedNetwork::new(config.network),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            timers: HashMap::new(),
            crashed: HashSet::new(),
            stats: SimulationStats::default(),
        }
    }

    /// Start every node: initial leader election, NewRound announcements,
    /// pacemaker timers.
    pub fn start(&mut self) {
        for index in 0..self.nodes.len() {
            let actions = self.nodes[index].start();
            self.execute_actions(index, actions);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Test instrumentation
    // ═══════════════════════════════════════════════════════════════════

    /// Take a node offline: its queued events are discarded and it
    /// processes nothing further.
    pub fn crash(&mut self, index: NodeIndex) {
        debug!(node = index, "crashing node");
        self.crashed.insert(index);
    }

    /// Inject a raw message into a node's queue (for Byzantine
    /// scenarios the honest cluster wouldn't produce).
    pub fn inject_message(&mut self, to: NodeIndex, message: HotstuffMessage) {
        let delay = self.network_delay();
        self.schedule(
            to,
            Event::MessageReceived {
                message: Box::new(message),
            },
            delay,
        );
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn node(&self, index: NodeIndex) -> &ConsensusState {
        &self.nodes[index]
    }

    pub fn keys(&self) -> &[KeyPair] {
        &self.keys
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// The committed chain of one node.
    pub fn committed(&self, index: NodeIndex) -> Vec<Block> {
        self.ledgers[index].committed()
    }

    /// Committed height of one node.
    pub fn committed_height(&self, index: NodeIndex) -> u64 {
        self.ledgers[index].height()
    }

    /// Every live node has committed at least `height` blocks.
    pub fn all_live_nodes_at_height(&self, height: u64) -> bool {
        (0..self.nodes.len())
            .filter(|i| !self.crashed.contains(i))
            .all(|i| self.committed_height(i) >= height)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Event loop
    // ═══════════════════════════════════════════════════════════════════

    /// Run until every live node commits `height` blocks, or until the
    /// virtual clock passes `max_time`. Returns whether the height was
    /// reached.
    pub fn run_until_height(&mut self, height: u64, max_time: Duration) -> bool {
        while !self.all_live_nodes_at_height(height) {
            if !self.step_one(max_time) {
                return false;
            }
        }
        true
    }

    /// Run the clock forward to `until`, processing everything due.
    pub fn run_until(&mut self, until: Duration) {
        while self.step_one(until) {}
    }

    /// Process the next queued event if it is due before `limit`.
    fn step_one(&mut self, limit: Duration) -> bool {
        let Some((&key, _)) = self.event_queue.iter().next() else {
            return false;
        };
        if key.time > limit {
            return false;
        }
        let (key, (node_index, event)) = self
            .event_queue
            .remove_entry(&key)
            .expect("key was just observed");
        self.now = key.time.max(self.now);

        if self.crashed.contains(&node_index) {
            trace!(node = node_index, event = event.type_name(), "dropping event for crashed node");
            return true;
        }
        // A fired pacemaker timer is consumed.
        if matches!(event, Event::PacemakerTimeout) {
            self.timers.remove(&node_index);
        }

        self.stats.events_processed += 1;
        self.nodes[node_index].set_time(self.now);
        let actions = self.nodes[node_index].handle(event);
        self.execute_actions(node_index, actions);
        true
    }

    fn execute_actions(&mut self, from: NodeIndex, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    for to in 0..self.nodes.len() {
                        self.deliver(from, to, (*message).clone());
                    }
                }
                Action::Send { to, message } => {
                    let Some(&to_index) = self.address_to_node.get(&to) else {
                        warn!(%to, "send to unknown address");
                        continue;
                    };
                    self.deliver(from, to_index, *message);
                }
                Action::SetTimer {
                    id: TimerId::Pacemaker,
                    duration,
                } => {
                    self.stats.timers_set += 1;
                    // Replacing an armed timer cancels the old deadline.
                    if let Some(old) = self.timers.remove(&from) {
                        self.event_queue.remove(&old);
                    }
                    let key = self.schedule(from, Event::PacemakerTimeout, duration);
                    self.timers.insert(from, key);
                }
                Action::CancelTimer {
                    id: TimerId::Pacemaker,
                } => {
                    self.stats.timers_cancelled += 1;
                    if let Some(old) = self.timers.remove(&from) {
                        self.event_queue.remove(&old);
                    }
                }
                Action::EmitCommitted { height, .. } => {
                    self.stats.blocks_committed += 1;
                    trace!(node = from, height = %height, "block committed");
                }
            }
        }
    }

    fn deliver(&mut self, from: NodeIndex, to: NodeIndex, message: HotstuffMessage) {
        if self.network.should_drop(from, to, &mut self.rng) {
            self.stats.messages_dropped += 1;
            return;
        }
        self.stats.messages_sent += 1;
        let delay = self.network.delay(&mut self.rng);
        self.schedule(
            to,
            Event::MessageReceived {
                message: Box::new(message),
            },
            delay,
        );
    }

    fn network_delay(&mut self) -> Duration {
        self.network.delay(&mut self.rng)
    }

    fn schedule(&mut self, to: NodeIndex, event: Event, delay: Duration) -> EventKey {
        let key = EventKey {
            time: self.now + delay,
            priority: event.priority(),
            sequence: self.sequence,
        };
        self.sequence += 1;
        self.event_queue.insert(key, (to, event));
        key
    }
}
