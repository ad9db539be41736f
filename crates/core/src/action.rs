//! Action types for the deterministic state machine.

use meridian_messages::HotstuffMessage;
use meridian_types::{Address, Block, BlockHeight};
use std::time::Duration;

/// Type alias for timer identification.
///
/// The pacemaker owns the sole timer; setting it again replaces the
/// previous deadline, cancelling it is the only cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// The pacemaker's per-step timeout.
    Pacemaker,
}

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The driver executes actions and may convert failures back into
/// events.
#[derive(Debug, Clone)]
pub enum Action {
    /// Broadcast a consensus message to all validators.
    Broadcast { message: Box<HotstuffMessage> },

    /// Send a consensus message to a single validator (votes go to the
    /// leader).
    Send {
        to: Address,
        message: Box<HotstuffMessage>,
    },

    /// Set a timer to fire after a duration, replacing any timer with
    /// the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    /// Notify external observers that a block was committed.
    ///
    /// The driver uses this for metrics (the height counter increments
    /// only on Decide success) and for anything downstream of finality.
    EmitCommitted { height: BlockHeight, block: Block },
}

impl Action {
    /// Check if this action performs network I/O.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Broadcast { .. } | Action::Send { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::Send { .. } => "Send",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EmitCommitted { .. } => "EmitCommitted",
        }
    }
}
