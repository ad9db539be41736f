//! Collaborator interface to the utility/persistence layer.
//!
//! The engine owns none of the internals behind these calls. Passing
//! the interface at construction breaks the module cycle the
//! engine-bus-module pattern would otherwise create.

use meridian_types::{Address, Block, BlockHeight, Hash};
use thiserror::Error;

/// An error reported by the utility layer.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct UtilityError(pub String);

/// The utility/persistence collaborator.
///
/// Calls may be slow (they touch storage); the driver must keep
/// queueing inbound messages while one is in flight. They are invoked
/// synchronously from the dispatcher and must never re-enter it.
pub trait UtilityProvider: Send {
    /// Begin a new block-building context at the given height,
    /// discarding any previous one.
    fn refresh_context(&mut self, height: BlockHeight) -> Result<(), UtilityError>;

    /// Reap transactions for a proposal, up to `max_tx_bytes`.
    fn get_proposal_transactions(
        &mut self,
        proposer: Address,
        max_tx_bytes: u64,
        byzantine: &[Address],
    ) -> Result<Vec<Vec<u8>>, UtilityError>;

    /// Apply a block's transactions against the current context,
    /// producing the application hash.
    fn apply_block(
        &mut self,
        height: BlockHeight,
        proposer: Address,
        transactions: &[Vec<u8>],
        byzantine: &[Address],
    ) -> Result<Hash, UtilityError>;

    /// Persist a decided block. This is the only call that mutates
    /// durable state.
    fn commit_block(&mut self, block: &Block) -> Result<(), UtilityError>;

    /// Structural block validation.
    fn validate_block_basic(&self, block: &Block) -> Result<(), UtilityError>;
}
