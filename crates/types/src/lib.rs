//! Core types for Meridian consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, cryptographic keys and signatures
//! - **Identifiers**: ValidatorId, BlockHeight, Address
//! - **Consensus types**: Block, BlockHeader, QuorumCertificate, HotstuffStep
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod crypto;
mod hash;
mod identifiers;

mod block;
mod certificate;
mod signing;
mod step;
mod validator;

pub use block::{Block, BlockError, BlockHeader};
pub use certificate::{CertificateError, PartialSignature, QuorumCertificate, ThresholdSignature};
pub use crypto::{KeyError, KeyPair, PublicKey, Signature};
pub use hash::Hash;
pub use identifiers::{Address, BlockHeight, ValidatorId};
pub use signing::{signable_bytes, DOMAIN_HOTSTUFF};
pub use step::{HotstuffStep, MessageType};
pub use validator::{Validator, ValidatorSet};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a deterministic keypair from a seed byte.
    pub fn test_keypair(seed: u8) -> KeyPair {
        KeyPair::from_seed([seed; 32])
    }

    /// Create a validator set of `n` validators with deterministic keys.
    ///
    /// Validator ids are 1-based; id 0 is reserved as the "no leader" sentinel.
    pub fn test_validator_set(n: u8) -> (Vec<KeyPair>, ValidatorSet) {
        let keys: Vec<KeyPair> = (0..n).map(test_keypair).collect();
        let validators = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Validator {
                id: ValidatorId(i as u64 + 1),
                address: k.address(),
                public_key: k.public_key(),
            })
            .collect();
        (keys, ValidatorSet::new(validators))
    }
}
