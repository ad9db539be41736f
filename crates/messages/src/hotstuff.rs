//! The consensus message envelope.

use meridian_types::{
    signable_bytes, Block, BlockHeight, HotstuffStep, KeyPair, MessageType, PartialSignature,
    PublicKey, QuorumCertificate,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("a proposal past Prepare must carry a justify certificate")]
    MissingJustify,
}

/// A single HotStuff protocol message.
///
/// - A `Propose` from the leader carries a block; past Prepare it also
///   carries the justify QC for the previous step. It never carries a
///   partial signature.
/// - A `Vote` carries the voter's partial signature over the message's
///   canonical bytes. NewRound votes additionally carry the voter's
///   high prepare QC in `justify_qc` so a new leader can adopt it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotstuffMessage {
    pub message_type: MessageType,
    pub height: BlockHeight,
    pub step: HotstuffStep,
    pub round: u64,
    pub block: Option<Block>,
    pub justify_qc: Option<QuorumCertificate>,
    pub partial_signature: Option<PartialSignature>,
}

impl HotstuffMessage {
    /// Build a leader proposal.
    pub fn propose(
        height: BlockHeight,
        round: u64,
        step: HotstuffStep,
        block: Block,
        justify_qc: Option<QuorumCertificate>,
    ) -> Result<Self, MessageError> {
        if step > HotstuffStep::Prepare && justify_qc.is_none() {
            return Err(MessageError::MissingJustify);
        }
        Ok(Self {
            message_type: MessageType::Propose,
            height,
            step,
            round,
            block: Some(block),
            justify_qc,
            partial_signature: None,
        })
    }

    /// Build a signed vote. Signs the canonical bytes and attaches a
    /// partial signature carrying the signer's address.
    pub fn vote(
        height: BlockHeight,
        round: u64,
        step: HotstuffStep,
        block: Option<Block>,
        key: &KeyPair,
    ) -> Self {
        let mut msg = Self {
            message_type: MessageType::Vote,
            height,
            step,
            round,
            block,
            justify_qc: None,
            partial_signature: None,
        };
        let signature = key.sign(&msg.signable_bytes());
        msg.partial_signature = Some(PartialSignature {
            address: key.address(),
            signature,
        });
        msg
    }

    /// Attach a justify certificate (NewRound votes carry the voter's
    /// high prepare QC). The justify is not part of the signable bytes,
    /// so this does not invalidate an existing partial signature.
    pub fn with_justify(mut self, justify_qc: Option<QuorumCertificate>) -> Self {
        self.justify_qc = justify_qc;
        self
    }

    /// The canonical signable bytes: the deterministic encoding of
    /// `(type, height, step, round, block_hash)` with signature fields
    /// cleared. Works on a cleared clone, never mutating in place, so
    /// verification always reconstructs the exact signed string.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut cleared = self.clone();
        cleared.partial_signature = None;
        signable_bytes(
            cleared.message_type,
            cleared.height,
            cleared.step,
            cleared.round,
            cleared.block.as_ref().map(|b| b.hash()),
        )
    }

    /// Verify the attached partial signature under `public_key`.
    /// Messages without a partial do not verify.
    pub fn verify_partial_signature(&self, public_key: &PublicKey) -> bool {
        match &self.partial_signature {
            Some(partial) => public_key.verify(&self.signable_bytes(), &partial.signature),
            None => false,
        }
    }

    pub fn is_vote(&self) -> bool {
        self.message_type == MessageType::Vote
    }

    pub fn is_propose(&self) -> bool {
        self.message_type == MessageType::Propose
    }

    /// The hash of the carried block, if any.
    pub fn block_hash(&self) -> Option<meridian_types::Hash> {
        self.block.as_ref().map(|b| b.hash())
    }
}
