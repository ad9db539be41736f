//! Validator set, fixed for a height.

use crate::{Address, PublicKey, ValidatorId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A participant in consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub id: ValidatorId,
    pub address: Address,
    pub public_key: PublicKey,
}

/// The validator set for a height.
///
/// Read-only once constructed; the engine never mutates membership
/// within a height.
#[derive(Debug, Clone)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    by_address: HashMap<Address, usize>,
    by_id: HashMap<ValidatorId, usize>,
}

impl ValidatorSet {
    pub fn new(validators: Vec<Validator>) -> Self {
        let by_address = validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.address, i))
            .collect();
        let by_id = validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id, i))
            .collect();
        Self {
            validators,
            by_address,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    pub fn get_by_address(&self, address: &Address) -> Option<&Validator> {
        self.by_address.get(address).map(|&i| &self.validators[i])
    }

    pub fn get_by_id(&self, id: ValidatorId) -> Option<&Validator> {
        self.by_id.get(&id).map(|&i| &self.validators[i])
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    /// The sole Byzantine threshold used across all steps:
    /// `n` endorsements meet quorum iff `n > ⌊2N/3⌋`.
    pub fn quorum_met(&self, n: usize) -> bool {
        3 * n > 2 * self.len()
    }

    /// The smallest count that meets quorum.
    pub fn quorum_size(&self) -> usize {
        2 * self.len() / 3 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_validator_set;

    #[test]
    fn quorum_threshold_is_strictly_greater() {
        let (_, set) = test_validator_set(4);
        // ⌊2·4/3⌋ = 2, so 3 votes meet quorum and 2 do not.
        assert!(!set.quorum_met(2));
        assert!(set.quorum_met(3));
        assert!(set.quorum_met(4));
        assert_eq!(set.quorum_size(), 3);
    }

    #[test]
    fn quorum_threshold_divisible_set() {
        let (_, set) = test_validator_set(6);
        // ⌊2·6/3⌋ = 4: exactly 4 is not enough.
        assert!(!set.quorum_met(4));
        assert!(set.quorum_met(5));
        assert_eq!(set.quorum_size(), 5);
    }

    #[test]
    fn lookups() {
        let (keys, set) = test_validator_set(4);
        assert_eq!(set.len(), 4);
        let v = set.get_by_id(ValidatorId(1)).unwrap();
        assert_eq!(v.address, keys[0].address());
        assert!(set.contains(&keys[3].address()));
        assert!(set.get_by_id(ValidatorId(9)).is_none());
    }
}
