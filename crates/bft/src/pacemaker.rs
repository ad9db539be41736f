//! The pacemaker: per-step timeouts with exponential back-off.
//!
//! The pacemaker owns the sole timer. Progress restarts it at the tail
//! of every message handler; expiry interrupts the round. The round and
//! height transitions themselves live on [`crate::ConsensusState`],
//! which is the only code allowed to move (height, round, step)
//! non-forward.

use meridian_core::{Action, TimerId};
use std::time::Duration;

/// Timeout policy for consensus steps.
#[derive(Debug, Clone)]
pub struct Pacemaker {
    base_timeout: Duration,
    max_exponent: u32,
}

impl Pacemaker {
    pub fn new(base_timeout: Duration, max_exponent: u32) -> Self {
        Self {
            base_timeout,
            max_exponent,
        }
    }

    /// The step timeout for a round: `base · 2^min(round, cap)`.
    pub fn timeout_for_round(&self, round: u64) -> Duration {
        let exponent = round.min(self.max_exponent as u64).min(31) as u32;
        self.base_timeout.saturating_mul(1u32 << exponent)
    }

    /// Arm the step timer for a round, replacing any previous deadline.
    pub fn start_timer(&self, round: u64) -> Action {
        Action::SetTimer {
            id: TimerId::Pacemaker,
            duration: self.timeout_for_round(round),
        }
    }

    /// Restart the timer after progress. Identical to `start_timer`;
    /// the distinct name marks handler tails.
    pub fn restart_timer(&self, round: u64) -> Action {
        self.start_timer(round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_round() {
        let pacemaker = Pacemaker::new(Duration::from_millis(100), 6);
        assert_eq!(pacemaker.timeout_for_round(0), Duration::from_millis(100));
        assert_eq!(pacemaker.timeout_for_round(1), Duration::from_millis(200));
        assert_eq!(pacemaker.timeout_for_round(3), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_capped() {
        let pacemaker = Pacemaker::new(Duration::from_millis(100), 4);
        assert_eq!(
            pacemaker.timeout_for_round(4),
            pacemaker.timeout_for_round(40)
        );
    }

    #[test]
    fn start_timer_targets_the_pacemaker_timer() {
        let pacemaker = Pacemaker::new(Duration::from_millis(100), 6);
        match pacemaker.start_timer(2) {
            Action::SetTimer { id, duration } => {
                assert_eq!(id, TimerId::Pacemaker);
                assert_eq!(duration, Duration::from_millis(400));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }
}
