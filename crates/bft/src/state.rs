//! The consensus state machine.
//!
//! This module owns the per-node consensus state and the top-level
//! dispatch. The leader and replica message paths live in their own
//! modules; round and height transitions are here because they are the
//! only code allowed to move (height, round, step) non-forward.

use crate::{
    ConsensusConfig, LeaderElection, MessagePool, Pacemaker, UtilityProvider,
};
use meridian_core::{Action, Event, StateMachine};
use meridian_messages::HotstuffMessage;
use meridian_types::{
    Address, Block, BlockHeight, Hash, HotstuffStep, KeyPair, MessageType, QuorumCertificate,
    ValidatorId, ValidatorSet,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// The node's role in the current round, computed fresh per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Replica,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Replica => "replica",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("local key {address} is not in the validator set")]
pub struct NotInValidatorSet {
    pub address: Address,
}

/// Per-node consensus state.
///
/// Created at node start, mutated only through [`StateMachine::handle`],
/// and rolled forward on Decide so the next height begins from a clean
/// pool.
pub struct ConsensusState {
    // ═══════════════════════════════════════════════════════════════════
    // Identity & collaborators
    // ═══════════════════════════════════════════════════════════════════
    pub(crate) key: KeyPair,
    pub(crate) address: Address,
    pub(crate) node_id: ValidatorId,
    pub(crate) validators: Arc<ValidatorSet>,
    pub(crate) utility: Box<dyn UtilityProvider>,
    election: Box<dyn LeaderElection>,
    pub(crate) config: ConsensusConfig,
    pub(crate) pacemaker: Pacemaker,

    // ═══════════════════════════════════════════════════════════════════
    // Consensus state
    // ═══════════════════════════════════════════════════════════════════
    pub(crate) height: BlockHeight,
    pub(crate) round: u64,
    pub(crate) step: HotstuffStep,
    pub(crate) block: Option<Block>,
    pub(crate) high_prepare_qc: Option<QuorumCertificate>,
    pub(crate) locked_qc: Option<QuorumCertificate>,
    pub(crate) leader_id: Option<ValidatorId>,
    pub(crate) pool: MessagePool,
    pub(crate) last_app_hash: Hash,
    committed_height: BlockHeight,

    now: Duration,
}

impl std::fmt::Debug for ConsensusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusState")
            .field("node_id", &self.node_id)
            .field("height", &self.height)
            .field("round", &self.round)
            .field("step", &self.step)
            .field("leader_id", &self.leader_id)
            .field("committed_height", &self.committed_height)
            .finish()
    }
}

impl ConsensusState {
    /// Create the state machine for one validator.
    ///
    /// The local key must belong to a member of `validators`.
    pub fn new(
        key: KeyPair,
        validators: Arc<ValidatorSet>,
        utility: Box<dyn UtilityProvider>,
        election: Box<dyn LeaderElection>,
        config: ConsensusConfig,
    ) -> Result<Self, NotInValidatorSet> {
        let address = key.address();
        let node_id = validators
            .get_by_address(&address)
            .map(|v| v.id)
            .ok_or(NotInValidatorSet { address })?;
        let pacemaker = Pacemaker::new(config.pacemaker_base_timeout, config.timeout_max_exponent);
        let pool = MessagePool::new(config.max_mempool_bytes);
        Ok(Self {
            key,
            address,
            node_id,
            validators,
            utility,
            election,
            config,
            pacemaker,
            height: BlockHeight(1),
            round: 0,
            step: HotstuffStep::NewRound,
            block: None,
            high_prepare_qc: None,
            locked_qc: None,
            leader_id: None,
            pool,
            last_app_hash: Hash::ZERO,
            committed_height: BlockHeight(0),
            now: Duration::ZERO,
        })
    }

    /// Kick off consensus: elect the first leader, announce NewRound,
    /// arm the pacemaker.
    pub fn start(&mut self) -> Vec<Action> {
        info!(
            node_id = %self.node_id,
            validators = self.validators.len(),
            height = %self.height,
            "starting consensus"
        );
        self.begin_round()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn step(&self) -> HotstuffStep {
        self.step
    }

    pub fn role(&self) -> Role {
        if self.leader_id == Some(self.node_id) {
            Role::Leader
        } else {
            Role::Replica
        }
    }

    pub fn node_id(&self) -> ValidatorId {
        self.node_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn leader_id(&self) -> Option<ValidatorId> {
        self.leader_id
    }

    pub fn locked_qc(&self) -> Option<&QuorumCertificate> {
        self.locked_qc.as_ref()
    }

    pub fn high_prepare_qc(&self) -> Option<&QuorumCertificate> {
        self.high_prepare_qc.as_ref()
    }

    pub fn committed_height(&self) -> BlockHeight {
        self.committed_height
    }

    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }

    /// Driver-supplied wall clock, updated before each `handle`.
    pub fn now(&self) -> Duration {
        self.now
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════

    fn on_message(&mut self, message: HotstuffMessage) -> Vec<Action> {
        let role = self.role();
        debug!(
            height = %self.height,
            round = self.round,
            step = %self.step,
            role = %role,
            msg_type = %message.message_type,
            msg_step = %message.step,
            "consensus message received"
        );

        let mut actions = match (role, message.message_type) {
            (Role::Leader, MessageType::Vote) => self.leader_on_vote(message),
            (Role::Replica, MessageType::Propose) => self.replica_on_propose(message),
            (Role::Leader, MessageType::Propose) => {
                // Our own broadcast comes back around; nothing to do.
                trace!("ignoring proposal echo while leading");
                vec![]
            }
            (Role::Replica, MessageType::Vote) => {
                trace!("ignoring vote; this node is not the leader");
                vec![]
            }
        };

        // Progress (or noise) resets the clock at the tail of every
        // message handler.
        actions.push(self.pacemaker.restart_timer(self.round));
        actions
    }

    // ═══════════════════════════════════════════════════════════════════
    // Round & height transitions (pacemaker-driven)
    // ═══════════════════════════════════════════════════════════════════

    /// Begin the current (height, round): elect a leader, announce
    /// NewRound carrying our high prepare certificate, arm the timer.
    pub(crate) fn begin_round(&mut self) -> Vec<Action> {
        self.elect_leader();

        let mut actions = Vec::new();
        let vote = HotstuffMessage::vote(
            self.height,
            self.round,
            HotstuffStep::NewRound,
            None,
            &self.key,
        )
        .with_justify(self.high_prepare_qc.clone());

        match self.leader_id {
            Some(id) if id == self.node_id => {
                // The leader consumes its own NewRound vote directly.
                actions.extend(self.leader_on_vote(vote));
            }
            Some(id) => {
                if let Some(leader) = self.validators.get_by_id(id) {
                    actions.push(Action::Send {
                        to: leader.address,
                        message: Box::new(vote),
                    });
                }
            }
            None => {
                debug!(
                    height = %self.height,
                    round = self.round,
                    "no leader this round; waiting for timeout"
                );
            }
        }

        actions.push(self.pacemaker.start_timer(self.round));
        actions
    }

    fn elect_leader(&mut self) {
        match self.election.elect(self.height, self.round) {
            Ok(id) if id != ValidatorId::NONE && self.validators.get_by_id(id).is_some() => {
                self.leader_id = Some(id);
                if id == self.node_id {
                    info!(height = %self.height, round = self.round, "elected self as leader");
                } else {
                    debug!(height = %self.height, round = self.round, leader = %id, "elected leader");
                }
            }
            Ok(id) => {
                warn!(leader = %id, "election produced no usable leader");
                self.leader_id = None;
            }
            Err(err) => {
                warn!(error = %err, "leader election failed");
                self.leader_id = None;
            }
        }
    }

    /// Cancel the current round: bump the round number, fall back to
    /// NewRound, re-announce with our high prepare certificate so work
    /// from the dead round survives the view change.
    pub(crate) fn interrupt_round(&mut self) -> Vec<Action> {
        warn!(
            height = %self.height,
            round = self.round,
            step = %self.step,
            "interrupting round"
        );
        self.round += 1;
        self.step = HotstuffStep::NewRound;
        self.block = None;
        self.leader_id = None;
        self.pool.clear_all();
        self.begin_round()
    }

    /// Commit a decided block through the utility layer and move to the
    /// next height. A commit failure interrupts the round instead; the
    /// next leader retries.
    pub(crate) fn commit_and_advance(&mut self, block: Block) -> Vec<Action> {
        if let Err(err) = self.utility.commit_block(&block) {
            error!(
                height = %self.height,
                block_hash = %block.hash(),
                error = %err,
                "failed to commit block"
            );
            return self.interrupt_round();
        }

        self.last_app_hash = block.header.app_hash;
        self.committed_height = block.header.height;
        info!(
            height = %block.header.height,
            block_hash = %block.hash(),
            txs = block.transactions.len(),
            role = %self.role(),
            "committed block"
        );

        let mut actions = vec![Action::EmitCommitted {
            height: block.header.height,
            block,
        }];
        actions.extend(self.begin_new_height());
        actions
    }

    /// Step to the next height with a clean pool. Certificates are
    /// cleared only when the committed block superseded them.
    fn begin_new_height(&mut self) -> Vec<Action> {
        self.height = self.height.next();
        self.round = 0;
        self.step = HotstuffStep::NewRound;
        self.block = None;
        self.leader_id = None;
        self.pool.clear_all();

        if self
            .locked_qc
            .as_ref()
            .is_some_and(|qc| qc.height <= self.committed_height)
        {
            self.locked_qc = None;
        }
        if self
            .high_prepare_qc
            .as_ref()
            .is_some_and(|qc| qc.height <= self.committed_height)
        {
            self.high_prepare_qc = None;
        }

        self.begin_round()
    }
}

impl StateMachine for ConsensusState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::PacemakerTimeout => self.interrupt_round(),
            Event::MessageReceived { message } => self.on_message(*message),
            Event::OutboundFailed { peer, reason } => {
                // Best-effort delivery; log and carry on.
                warn!(?peer, reason = %reason, "outbound delivery failed");
                vec![]
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}
