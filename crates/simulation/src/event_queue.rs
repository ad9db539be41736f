//! Deterministic event ordering.

use meridian_core::EventPriority;
use std::time::Duration;

/// Global ordering key for queued events.
///
/// Events are processed by (time, priority, sequence). The sequence
/// counter breaks ties deterministically: two events scheduled for the
/// same instant at the same priority fire in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub sequence: u64,
}
