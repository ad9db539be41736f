//! Network messages for the consensus protocol.

mod codec;
mod hotstuff;

pub use codec::{decode_message, encode_message, CodecError, TOPIC_CONSENSUS, WIRE_VERSION};
pub use hotstuff::{HotstuffMessage, MessageError};
