//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][payload: BCS-encoded HotstuffMessage]
//! ```
//!
//! Message kind is determined by the transport topic, not by a field in
//! the framing; the payload bytes are handed to the transport verbatim.

use crate::HotstuffMessage;
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Topic tag identifying consensus payloads on the transport.
pub const TOPIC_CONSENSUS: &str = "consensus.hotstuff";

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("message too short")]
    MessageTooShort,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),
}

/// Encode a consensus message to wire format.
pub fn encode_message(message: &HotstuffMessage) -> Result<Vec<u8>, CodecError> {
    let payload = bcs::to_bytes(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a consensus message from wire format.
pub fn decode_message(data: &[u8]) -> Result<HotstuffMessage, CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::MessageTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    bcs::from_bytes(payload).map_err(|e| CodecError::Decode(e.to_string()))
}
