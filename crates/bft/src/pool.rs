//! The leader's per-step vote pool.
//!
//! A mapping from step to the votes collected for the current
//! (height, round). Admission semantics the pool itself enforces:
//! dedup by signer address (a single Byzantine signer must never reach
//! quorum alone) and byte accounting over the stored messages against
//! the configured cap. Signature and phase checks happen before
//! insertion, in the dispatcher.

use meridian_messages::HotstuffMessage;
use meridian_types::{Address, HotstuffStep, QuorumCertificate};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("duplicate vote from {address}")]
    DuplicateSigner { address: Address },

    #[error("vote has no partial signature to dedup on")]
    MissingSigner,

    #[error("consensus message pool is full ({used} of {cap} bytes)")]
    Full { used: u64, cap: u64 },
}

#[derive(Debug, Default)]
struct Slot {
    messages: Vec<HotstuffMessage>,
    signers: HashSet<Address>,
    bytes: u64,
}

/// Per-step buffer of vote messages awaiting quorum.
#[derive(Debug)]
pub struct MessagePool {
    slots: [Slot; 5],
    used_bytes: u64,
    max_bytes: u64,
}

fn slot_index(step: HotstuffStep) -> usize {
    step as usize - 1
}

impl MessagePool {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            slots: Default::default(),
            used_bytes: 0,
            max_bytes,
        }
    }

    /// Admit a vote into its step slot. The vote must carry a partial
    /// signature (its address is the dedup key).
    pub fn insert(&mut self, message: HotstuffMessage) -> Result<(), PoolError> {
        let address = message
            .partial_signature
            .as_ref()
            .map(|p| p.address)
            .ok_or(PoolError::MissingSigner)?;

        let size = bcs::to_bytes(&message)
            .map(|b| b.len() as u64)
            .unwrap_or_default();
        if self.used_bytes + size > self.max_bytes {
            return Err(PoolError::Full {
                used: self.used_bytes,
                cap: self.max_bytes,
            });
        }

        let slot = &mut self.slots[slot_index(message.step)];
        if !slot.signers.insert(address) {
            return Err(PoolError::DuplicateSigner { address });
        }
        slot.bytes += size;
        self.used_bytes += size;
        slot.messages.push(message);
        Ok(())
    }

    /// Number of admitted votes for a step.
    pub fn count(&self, step: HotstuffStep) -> usize {
        self.slots[slot_index(step)].messages.len()
    }

    /// The admitted votes for a step, in arrival order.
    pub fn messages(&self, step: HotstuffStep) -> &[HotstuffMessage] {
        &self.slots[slot_index(step)].messages
    }

    /// Bytes currently held across all slots.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// The highest justify certificate carried by the step's votes:
    /// maximum height, ties broken by round.
    pub fn high_justify_qc(&self, step: HotstuffStep) -> Option<&QuorumCertificate> {
        self.slots[slot_index(step)]
            .messages
            .iter()
            .filter_map(|m| m.justify_qc.as_ref())
            .max_by_key(|qc| (qc.height, qc.round))
    }

    /// Drop everything collected for a step (called on every step
    /// transition for the step just consumed).
    pub fn clear(&mut self, step: HotstuffStep) {
        let slot = &mut self.slots[slot_index(step)];
        self.used_bytes -= slot.bytes;
        *slot = Slot::default();
    }

    /// Drop everything (round interrupt, new height).
    pub fn clear_all(&mut self) {
        for step in HotstuffStep::ALL {
            self.clear(step);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.messages.is_empty())
    }
}
