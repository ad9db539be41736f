//! The leader message path.
//!
//! The leader collects votes for the current step, and on crossing the
//! optimistic threshold builds a quorum certificate, advances one step,
//! broadcasts the next proposal, and votes on it itself (the leader
//! also acts as a replica). The threshold is optimistic: the leader
//! moves the moment it is crossed and does not wait for stragglers.

use crate::error::{QcError, ValidationError};
use crate::pool::PoolError;
use crate::state::ConsensusState;
use crate::traits::UtilityError;
use meridian_core::Action;
use meridian_messages::HotstuffMessage;
use meridian_types::{
    Address, Block, BlockHeader, HotstuffStep, QuorumCertificate, ThresholdSignature,
};
use tracing::{debug, error, info, trace, warn};

impl ConsensusState {
    /// Entry point for every vote the leader receives, its own
    /// included.
    pub(crate) fn leader_on_vote(&mut self, message: HotstuffMessage) -> Vec<Action> {
        if let Err(err) = self.validate_vote(&message) {
            warn!(error = %err, voter = ?message.partial_signature.as_ref().map(|p| p.address), "dropping vote");
            return vec![];
        }

        match self.pool.insert(message) {
            Ok(()) => {}
            Err(err @ PoolError::DuplicateSigner { .. }) => {
                trace!(error = %err, "vote already pooled");
                return vec![];
            }
            Err(err) => {
                warn!(error = %err, "vote not admitted to pool");
                return vec![];
            }
        }

        let step = self.step;
        let have = self.pool.count(step);
        if !self.validators.quorum_met(have) {
            debug!(
                step = %step,
                have,
                need = self.validators.quorum_size(),
                "optimistic vote count waiting"
            );
            return vec![];
        }
        info!(step = %step, have, "optimistic vote count passed");

        match step {
            HotstuffStep::NewRound => self.on_new_round_quorum(),
            HotstuffStep::Prepare | HotstuffStep::PreCommit | HotstuffStep::Commit => {
                self.on_vote_quorum(step)
            }
            HotstuffStep::Decide => {
                // Decide is terminal; no votes are ever cast for it.
                trace!("ignoring vote at Decide");
                vec![]
            }
        }
    }

    /// Admission filter: exact (height, step, round), structurally
    /// valid block if present, and a verifying partial signature from a
    /// known validator.
    fn validate_vote(&self, message: &HotstuffMessage) -> Result<(), ValidationError> {
        if message.height != self.height
            || message.round != self.round
            || message.step != self.step
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

        if let Some(block) = &message.block {
            self.utility
                .validate_block_basic(block)
                .map_err(|e| ValidationError::Block(e.to_string()))?;
        }

        let partial = message
            .partial_signature
            .as_ref()
            .ok_or(ValidationError::MissingPartialSignature)?;
        let validator = self.validators.get_by_address(&partial.address).ok_or(
            ValidationError::UnknownValidator {
                address: partial.address,
            },
        )?;
        if !message.verify_partial_signature(&validator.public_key) {
            return Err(ValidationError::InvalidSignature {
                address: partial.address,
            });
        }
        Ok(())
    }

    /// Quorum of NewRound votes: pick (or build) the block to drive
    /// this round, advance to Prepare, and propose it.
    fn on_new_round_quorum(&mut self) -> Vec<Action> {
        if let Err(err) = self.utility.refresh_context(self.height) {
            error!(error = %err, "failed to refresh utility context");
            return self.interrupt_round();
        }

        // Highest prepare certificate announced by this round's votes.
        // Adopt its block when it is for the current height; anything
        // older is superseded and we reap a fresh block instead.
        let mut justify: Option<QuorumCertificate> = None;
        if let Some(qc) = self.pool.high_justify_qc(HotstuffStep::NewRound) {
            if qc.height == self.height {
                match qc.validate(&self.validators) {
                    Ok(()) => justify = Some(qc.clone()),
                    Err(err) => {
                        warn!(error = %err, "ignoring invalid high prepare certificate");
                    }
                }
            }
        }

        let block = match &justify {
            Some(qc) => {
                let block = qc.block.clone();
                info!(
                    height = %self.height,
                    round = self.round,
                    block_hash = %block.hash(),
                    qc_round = qc.round,
                    "adopting block from high prepare certificate"
                );
                if let Err(err) = self.apply_existing_block(&block) {
                    error!(error = %err, "failed to apply adopted block");
                    return self.interrupt_round();
                }
                block
            }
            None => match self.prepare_and_apply_block() {
                Ok(block) => block,
                Err(err) => {
                    error!(error = %err, "failed to prepare block");
                    return self.interrupt_round();
                }
            },
        };

        self.step = HotstuffStep::Prepare;
        self.pool.clear(HotstuffStep::NewRound);
        self.block = Some(block.clone());

        let propose = match HotstuffMessage::propose(
            self.height,
            self.round,
            HotstuffStep::Prepare,
            block.clone(),
            justify,
        ) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "failed to create Prepare proposal");
                return self.interrupt_round();
            }
        };

        let mut actions = vec![Action::Broadcast {
            message: Box::new(propose),
        }];

        // The leader also acts as a replica.
        let vote = HotstuffMessage::vote(
            self.height,
            self.round,
            HotstuffStep::Prepare,
            Some(block),
            &self.key,
        );
        actions.extend(self.leader_on_vote(vote));
        actions
    }

    /// Quorum of Prepare/PreCommit/Commit votes: build the certificate,
    /// advance, and either propose the next step or (after Commit)
    /// decide and commit.
    fn on_vote_quorum(&mut self, step: HotstuffStep) -> Vec<Action> {
        let qc = match self.build_qc(step) {
            Ok(qc) => qc,
            Err(err) => {
                // Should not happen with the pool filter in place; hold
                // the step and let the pacemaker fire.
                warn!(error = %err, step = %step, "failed to build certificate");
                return vec![];
            }
        };

        let Some(next) = step.next() else {
            return vec![];
        };
        let Some(block) = self.block.clone() else {
            warn!(step = %step, "no block at quorum");
            return vec![];
        };

        match step {
            HotstuffStep::Prepare => self.high_prepare_qc = Some(qc.clone()),
            HotstuffStep::PreCommit => self.locked_qc = Some(qc.clone()),
            _ => {}
        }
        self.step = next;
        self.pool.clear(step);

        let propose = match HotstuffMessage::propose(
            self.height,
            self.round,
            next,
            block.clone(),
            Some(qc),
        ) {
            Ok(message) => message,
            Err(err) => {
                error!(error = %err, "failed to create proposal");
                return self.interrupt_round();
            }
        };

        let mut actions = vec![Action::Broadcast {
            message: Box::new(propose),
        }];

        if next == HotstuffStep::Decide {
            // No replica behavior to imitate here; the leader commits
            // the proposal it just finalized.
            actions.extend(self.commit_and_advance(block));
        } else {
            let vote =
                HotstuffMessage::vote(self.height, self.round, next, Some(block), &self.key);
            actions.extend(self.leader_on_vote(vote));
        }
        actions
    }

    /// Aggregate the pooled partials for a step into a certificate.
    ///
    /// The pool admission filter already verified every partial; this
    /// re-filters by exact tuple and block identity so a vote for a
    /// different block can never poison the aggregate.
    fn build_qc(&self, step: HotstuffStep) -> Result<QuorumCertificate, QcError> {
        let block = self.block.clone().ok_or(QcError::NoBlock { step })?;
        let block_hash = block.hash();

        let mut partials = Vec::new();
        for message in self.pool.messages(step) {
            if message.height != self.height
                || message.step != step
                || message.round != self.round
            {
                warn!(msg_step = %message.step, "unexpected message in pool slot");
                continue;
            }
            if message.block_hash() != Some(block_hash) {
                warn!(
                    voter = ?message.partial_signature.as_ref().map(|p| p.address),
                    "vote is for a different block; skipping its partial"
                );
                continue;
            }
            let Some(partial) = message.partial_signature.as_ref() else {
                warn!("pooled vote is missing its partial signature");
                continue;
            };
            partials.push(partial.clone());
        }

        if !self.validators.quorum_met(partials.len()) {
            return Err(QcError::QuorumNotMet {
                step,
                have: partials.len(),
                need: self.validators.quorum_size(),
            });
        }

        Ok(QuorumCertificate {
            height: self.height,
            step,
            round: self.round,
            block,
            threshold_signature: ThresholdSignature::aggregate(partials),
        })
    }

    /// Re-apply a block adopted from a high prepare certificate and
    /// check it reproduces the header's application hash.
    fn apply_existing_block(&mut self, block: &Block) -> Result<(), UtilityError> {
        let app_hash = self.utility.apply_block(
            block.header.height,
            block.header.proposer,
            &block.transactions,
            &[],
        )?;
        if app_hash != block.header.app_hash {
            return Err(UtilityError(format!(
                "application hash mismatch: computed {app_hash}, header has {}",
                block.header.app_hash
            )));
        }
        Ok(())
    }

    /// Reap a fresh block from the utility layer and apply it,
    /// producing the application hash for the header.
    fn prepare_and_apply_block(&mut self) -> Result<Block, UtilityError> {
        // TODO: plumb the byzantine validator list from the utility
        // layer once it tracks faults.
        let byzantine: &[Address] = &[];

        let transactions = self.utility.get_proposal_transactions(
            self.address,
            self.config.max_tx_bytes,
            byzantine,
        )?;
        let app_hash =
            self.utility
                .apply_block(self.height, self.address, &transactions, byzantine)?;

        let header = BlockHeader {
            height: self.height,
            app_hash,
            prev_block_hash: self.last_app_hash,
            proposer: self.address,
            tx_count: transactions.len() as u32,
        };
        Ok(Block::new(header, transactions))
    }
}
