//! Blocks as the consensus engine sees them.
//!
//! The payload is opaque: transactions are byte strings produced and
//! interpreted by the utility layer. The engine only reads the header.

use crate::{Address, BlockHeight, Hash};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("transaction count {actual} does not match header tx_count {declared}")]
    TxCountMismatch { declared: u32, actual: usize },

    #[error("application hash is unset")]
    MissingAppHash,

    #[error("block height is zero")]
    ZeroHeight,
}

/// Consensus metadata for a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// The height this block occupies.
    pub height: BlockHeight,
    /// Application hash produced by applying the block's transactions.
    pub app_hash: Hash,
    /// The previous block's application hash (`Hash::ZERO` at the first
    /// height).
    pub prev_block_hash: Hash,
    /// Address of the validator that proposed this block.
    pub proposer: Address,
    /// Number of transactions in the payload.
    pub tx_count: u32,
}

/// A block: header plus opaque transaction payload.
///
/// Immutable once produced for a (height, round).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Vec<u8>>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// The block's identity: the hash of its canonical header encoding.
    pub fn hash(&self) -> Hash {
        let bytes = bcs::to_bytes(&self.header).expect("header serialization is infallible");
        Hash::from_bytes(&bytes)
    }

    /// Structural well-formedness. Semantic validation (whether the
    /// transactions apply) belongs to the utility layer.
    pub fn validate_basic(&self) -> Result<(), BlockError> {
        if self.header.height.0 == 0 {
            return Err(BlockError::ZeroHeight);
        }
        if self.header.app_hash.is_zero() {
            return Err(BlockError::MissingAppHash);
        }
        if self.header.tx_count as usize != self.transactions.len() {
            return Err(BlockError::TxCountMismatch {
                declared: self.header.tx_count,
                actual: self.transactions.len(),
            });
        }
        Ok(())
    }
}
