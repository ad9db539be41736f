//! The transport boundary.
//!
//! The p2p layer is an external collaborator; the runner only needs a
//! fire-and-forget broadcast and a delivery-attempt unicast, both
//! topic-tagged. Implementations are internally synchronized and may be
//! called from background send tasks.

use meridian_types::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is unknown to the transport")]
    UnknownPeer(Address),

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Broadcast/send primitive over the wire.
///
/// Bytes are consumed verbatim; the topic tag identifies the payload
/// kind. No engine-internal framing happens here.
pub trait Transport: Send + Sync {
    /// Deliver to every validator, best-effort.
    fn broadcast(&self, topic: &str, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Attempt delivery to a single validator.
    fn send(&self, to: Address, topic: &str, bytes: Vec<u8>) -> Result<(), TransportError>;
}
