//! The replica message path.
//!
//! A replica consumes the elected leader's proposals, enforces the
//! step-specific safety rules, records the proposed state, and casts a
//! vote back to the leader. It never aggregates votes. Any failed check
//! drops the message and lets the round run to timeout; the node does
//! not retaliate.

use crate::error::ValidationError;
use crate::state::ConsensusState;
use meridian_core::Action;
use meridian_messages::HotstuffMessage;
use meridian_types::{Block, HotstuffStep, QuorumCertificate};
use tracing::{debug, error, trace, warn};

impl ConsensusState {
    /// Entry point for every proposal a replica receives.
    pub(crate) fn replica_on_propose(&mut self, message: HotstuffMessage) -> Vec<Action> {
        if let Err(err) = self.validate_proposal(&message) {
            warn!(
                error = %err,
                msg_step = %message.step,
                "dropping proposal"
            );
            return vec![];
        }
        let Some(block) = message.block.clone() else {
            return vec![];
        };

        match message.step {
            HotstuffStep::Prepare => self.replica_on_prepare(message, block),
            HotstuffStep::PreCommit => self.replica_on_precommit(message, block),
            HotstuffStep::Commit => self.replica_on_commit(message, block),
            HotstuffStep::Decide => self.replica_on_decide(block),
            // Proposals are never made at NewRound.
            HotstuffStep::NewRound => vec![],
        }
    }

    /// Proposal validation: phase, leader attribution, block structure,
    /// then the step-specific safety/liveness rule.
    fn validate_proposal(&self, message: &HotstuffMessage) -> Result<(), ValidationError> {
        // Step advancement is strictly monotonic within a round; a
        // proposal for a past or current step is dropped, not replayed.
        if message.height != self.height
            || message.round != self.round
            || message.step <= self.step
        {
            return Err(ValidationError::OutOfPhase {
                height: message.height,
                step: message.step,
                round: message.round,
                current_height: self.height,
                current_step: self.step,
                current_round: self.round,
            });
        }

        let leader_address = self
            .leader_id
            .and_then(|id| self.validators.get_by_id(id))
            .map(|v| v.address)
            .ok_or(ValidationError::NoLeader)?;

        let block = message.block.as_ref().ok_or(ValidationError::MissingBlock)?;
        if block.header.proposer != leader_address {
            return Err(ValidationError::NotFromLeader);
        }

        self.utility
            .validate_block_basic(block)
            .map_err(|e| ValidationError::Block(e.to_string()))?;

        match message.step {
            HotstuffStep::Prepare => {
                self.check_safe_extension(block, message.justify_qc.as_ref())
            }
            HotstuffStep::PreCommit => self.check_justify(message, HotstuffStep::Prepare),
            HotstuffStep::Commit => self.check_justify(message, HotstuffStep::PreCommit),
            HotstuffStep::Decide => self.check_justify(message, HotstuffStep::Commit),
            HotstuffStep::NewRound => Ok(()),
        }
    }

    /// The HotStuff safe-extension rule for Prepare proposals: accept
    /// when the block extends (or is) the locked block, or when the
    /// justify certificate is higher than the lock.
    fn check_safe_extension(
        &self,
        block: &Block,
        justify: Option<&QuorumCertificate>,
    ) -> Result<(), ValidationError> {
        if let Some(qc) = justify {
            qc.validate(&self.validators)?;
        }

        let Some(locked) = &self.locked_qc else {
            return Ok(());
        };

        let extends_lock = block.hash() == locked.block.hash()
            || block.header.prev_block_hash == locked.block.header.app_hash;
        let supersedes_lock = justify.is_some_and(|qc| qc.height > locked.height);

        if extends_lock || supersedes_lock {
            Ok(())
        } else {
            Err(ValidationError::UnsafeExtension {
                locked_height: locked.height,
            })
        }
    }

    /// Justify checks for PreCommit/Commit/Decide: the certificate must
    /// be for the previous step and the very block being proposed, and
    /// must verify against the validator set.
    fn check_justify(
        &self,
        message: &HotstuffMessage,
        want_step: HotstuffStep,
    ) -> Result<(), ValidationError> {
        let qc = message
            .justify_qc
            .as_ref()
            .ok_or(ValidationError::MissingJustify { step: message.step })?;
        if qc.step != want_step {
            return Err(ValidationError::JustifyStepMismatch {
                got: qc.step,
                want: want_step,
            });
        }
        let block = message.block.as_ref().ok_or(ValidationError::MissingBlock)?;
        if qc.block.hash() != block.hash() {
            return Err(ValidationError::JustifyBlockMismatch);
        }
        qc.validate(&self.validators)?;
        Ok(())
    }

    /// Prepare: apply the proposal to the utility layer before
    /// endorsing it, then record state and vote.
    fn replica_on_prepare(&mut self, message: HotstuffMessage, block: Block) -> Vec<Action> {
        if let Err(err) = self.utility.refresh_context(self.height) {
            error!(error = %err, "failed to refresh utility context");
            return self.interrupt_round();
        }
        let applied = self.utility.apply_block(
            block.header.height,
            block.header.proposer,
            &block.transactions,
            &[],
        );
        match applied {
            Ok(app_hash) if app_hash == block.header.app_hash => {}
            Ok(app_hash) => {
                warn!(
                    computed = %app_hash,
                    declared = %block.header.app_hash,
                    "proposal's application hash does not reproduce; not voting"
                );
                return vec![];
            }
            Err(err) => {
                error!(error = %err, "failed to apply proposed block");
                return self.interrupt_round();
            }
        }

        // A justify here is the leader's adopted high prepare
        // certificate; remember it if it beats ours.
        if let Some(qc) = &message.justify_qc {
            if self
                .high_prepare_qc
                .as_ref()
                .is_none_or(|have| (qc.height, qc.round) > (have.height, have.round))
            {
                self.high_prepare_qc = Some(qc.clone());
            }
        }

        self.step = HotstuffStep::Prepare;
        self.block = Some(block.clone());
        self.send_vote_to_leader(HotstuffStep::Prepare, block)
    }

    /// PreCommit: the justify is the round's PrepareQC; store it.
    fn replica_on_precommit(&mut self, message: HotstuffMessage, block: Block) -> Vec<Action> {
        self.high_prepare_qc = message.justify_qc.clone();
        self.step = HotstuffStep::PreCommit;
        self.block = Some(block.clone());
        self.send_vote_to_leader(HotstuffStep::PreCommit, block)
    }

    /// Commit: the justify is the round's PreCommitQC; lock on it.
    fn replica_on_commit(&mut self, message: HotstuffMessage, block: Block) -> Vec<Action> {
        self.locked_qc = message.justify_qc.clone();
        self.step = HotstuffStep::Commit;
        self.block = Some(block.clone());
        self.send_vote_to_leader(HotstuffStep::Commit, block)
    }

    /// Decide is terminal: commit the block and move to the next
    /// height. No vote is cast.
    fn replica_on_decide(&mut self, block: Block) -> Vec<Action> {
        self.step = HotstuffStep::Decide;
        self.commit_and_advance(block)
    }

    fn send_vote_to_leader(&mut self, step: HotstuffStep, block: Block) -> Vec<Action> {
        let Some(leader_address) = self
            .leader_id
            .and_then(|id| self.validators.get_by_id(id))
            .map(|v| v.address)
        else {
            debug!(step = %step, "no leader to vote to");
            return vec![];
        };

        let vote = HotstuffMessage::vote(self.height, self.round, step, Some(block), &self.key);
        trace!(step = %step, leader = %leader_address, "casting vote");
        vec![Action::Send {
            to: leader_address,
            message: Box::new(vote),
        }]
    }
}
