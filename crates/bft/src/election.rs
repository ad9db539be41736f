//! Leader election.
//!
//! The engine only requires determinism: every honest validator calling
//! with the same (height, round) must get the same id, so leaders
//! converge without extra rounds. The scheme itself (round-robin,
//! stake-weighted, VRF) is the collaborator's choice.

use meridian_types::{BlockHeight, ValidatorId, ValidatorSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("validator set is empty")]
    EmptySet,

    #[error("election produced unknown validator {0}")]
    UnknownValidator(ValidatorId),
}

/// Deterministic mapping (height, round) → validator id.
///
/// Returning `ValidatorId::NONE` or an error clears the leader; the
/// round then proceeds leaderless until the pacemaker fires.
pub trait LeaderElection: Send {
    fn elect(&self, height: BlockHeight, round: u64) -> Result<ValidatorId, ElectionError>;
}

/// Round-robin rotation over the validator set, keyed by height plus
/// round so a failed round moves to the next validator.
#[derive(Debug, Clone)]
pub struct RoundRobinElection {
    ids: Vec<ValidatorId>,
}

impl RoundRobinElection {
    pub fn new(validators: &ValidatorSet) -> Self {
        let mut ids: Vec<ValidatorId> = validators.iter().map(|v| v.id).collect();
        ids.sort();
        Self { ids }
    }
}

impl LeaderElection for RoundRobinElection {
    fn elect(&self, height: BlockHeight, round: u64) -> Result<ValidatorId, ElectionError> {
        if self.ids.is_empty() {
            return Err(ElectionError::EmptySet);
        }
        let index = (height.0.wrapping_add(round) % self.ids.len() as u64) as usize;
        Ok(self.ids[index])
    }
}
