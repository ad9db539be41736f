//! Engine error taxonomy.
//!
//! Everything here is recoverable: validation failures drop the
//! message, certificate failures hold the step until the pacemaker
//! fires. Only the utility layer reporting corruption would surface
//! past the dispatcher, and that is its collaborator's call.

use meridian_types::{Address, BlockHeight, CertificateError, HotstuffStep};
use thiserror::Error;

/// Why an inbound message was dropped.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("partial signature is missing")]
    MissingPartialSignature,

    #[error("signer {address} is not in the validator set")]
    UnknownValidator { address: Address },

    #[error("partial signature from {address} does not verify")]
    InvalidSignature { address: Address },

    #[error(
        "message for (h={height}, s={step}, r={round}) does not match \
         current (h={current_height}, s={current_step}, r={current_round})"
    )]
    OutOfPhase {
        height: BlockHeight,
        step: HotstuffStep,
        round: u64,
        current_height: BlockHeight,
        current_step: HotstuffStep,
        current_round: u64,
    },

    #[error("no leader is elected for this round")]
    NoLeader,

    #[error("proposal does not come from the elected leader")]
    NotFromLeader,

    #[error("proposal is missing its block")]
    MissingBlock,

    #[error("block failed basic validation: {0}")]
    Block(String),

    #[error("proposal at step {step} is missing its justify certificate")]
    MissingJustify { step: HotstuffStep },

    #[error("justify certificate is at step {got}, expected {want}")]
    JustifyStepMismatch { got: HotstuffStep, want: HotstuffStep },

    #[error("justify certificate is for a different block")]
    JustifyBlockMismatch,

    #[error("justify certificate is invalid: {0}")]
    JustifyInvalid(#[from] CertificateError),

    #[error("proposal conflicts with the locked certificate at height {locked_height}")]
    UnsafeExtension { locked_height: BlockHeight },
}

/// Why building a quorum certificate failed.
///
/// With the pool admission filter in place these should not occur; a
/// failure is logged and the step is held until the pacemaker fires.
#[derive(Debug, Error)]
pub enum QcError {
    #[error("no block to certify at step {step}")]
    NoBlock { step: HotstuffStep },

    #[error("quorum not met at step {step}: {have} of {need} required partials")]
    QuorumNotMet {
        step: HotstuffStep,
        have: usize,
        need: usize,
    },
}
