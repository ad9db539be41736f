//! Event types for the deterministic state machine.

use meridian_messages::HotstuffMessage;
use meridian_types::Address;

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    Internal = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,
}

/// All possible events a consensus node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    /// The pacemaker's step timer expired without progress.
    PacemakerTimeout,

    /// Received a consensus message from the network.
    ///
    /// Sender identity is carried by the message itself (the partial
    /// signature on votes, the proposer address on proposals), not by
    /// a transport-level `from` field.
    MessageReceived { message: Box<HotstuffMessage> },

    /// A background outbound send failed.
    ///
    /// Delivery is best-effort; the dispatcher logs these and carries on.
    OutboundFailed {
        /// Unicast target, `None` for a broadcast.
        peer: Option<Address>,
        reason: String,
    },
}

impl Event {
    /// Get the priority for this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::OutboundFailed { .. } => EventPriority::Internal,
            Event::PacemakerTimeout => EventPriority::Timer,
            Event::MessageReceived { .. } => EventPriority::Network,
        }
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::PacemakerTimeout => "PacemakerTimeout",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::OutboundFailed { .. } => "OutboundFailed",
        }
    }
}
