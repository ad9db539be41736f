//! The state machine contract.

use crate::{Action, Event};
use std::time::Duration;

/// A synchronous, deterministic state machine.
///
/// Drivers feed events in FIFO order and execute the returned actions.
/// Implementations must not perform I/O and must not re-enter the
/// dispatcher from within `handle`.
pub trait StateMachine {
    /// Process one event, returning the actions it produced.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Inform the state machine of the current time. Drivers call this
    /// before each `handle`.
    fn set_time(&mut self, now: Duration);
}
