//! Canonical signing payloads.
//!
//! The signable bytes of a consensus message are the deterministic BCS
//! encoding of `(type, height, step, round, block_hash)` behind a
//! domain tag. Signature verification reconstructs this exact byte
//! string; both the message layer and certificate validation use this
//! module so the two can never drift apart.

use crate::{BlockHeight, Hash, HotstuffStep, MessageType};
use serde::Serialize;

/// Domain separation tag for consensus message signatures.
pub const DOMAIN_HOTSTUFF: &[u8] = b"hotstuff_msg:";

#[derive(Serialize)]
struct SignablePayload {
    message_type: MessageType,
    height: BlockHeight,
    step: HotstuffStep,
    round: u64,
    block_hash: Option<Hash>,
}

/// Build the canonical signable bytes for a consensus message.
pub fn signable_bytes(
    message_type: MessageType,
    height: BlockHeight,
    step: HotstuffStep,
    round: u64,
    block_hash: Option<Hash>,
) -> Vec<u8> {
    let payload = SignablePayload {
        message_type,
        height,
        step,
        round,
        block_hash,
    };
    let encoded = bcs::to_bytes(&payload).expect("payload serialization is infallible");
    let mut out = Vec::with_capacity(DOMAIN_HOTSTUFF.len() + encoded.len());
    out.extend_from_slice(DOMAIN_HOTSTUFF);
    out.extend_from_slice(&encoded);
    out
}
