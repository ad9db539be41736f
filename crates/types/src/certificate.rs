//! Partial signatures, threshold signatures, and quorum certificates.

use crate::{signable_bytes, Address, Block, BlockHeight, HotstuffStep, MessageType, ValidatorSet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("quorum not met: {have} distinct valid partials of {total} validators")]
    QuorumNotMet { have: usize, total: usize },

    #[error("partial from {address} is not a known validator")]
    UnknownSigner { address: Address },

    #[error("partial from {address} does not verify")]
    InvalidPartial { address: Address },
}

/// A single validator's endorsement of a (height, step, round, block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub address: Address,
    pub signature: crate::Signature,
}

/// The aggregate the leader builds from collected partials.
///
/// The aggregation is a plain ordered list; verifiers re-check every
/// partial against the same canonical bytes the signers used. A real
/// threshold scheme could replace this without touching the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThresholdSignature {
    signatures: Vec<PartialSignature>,
}

impl ThresholdSignature {
    /// Aggregate partials, retaining order.
    pub fn aggregate(partials: Vec<PartialSignature>) -> Self {
        Self {
            signatures: partials,
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartialSignature> {
        self.signatures.iter()
    }
}

/// Proof that a quorum voted for the same (height, step, round, block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    pub height: BlockHeight,
    pub step: HotstuffStep,
    pub round: u64,
    pub block: Block,
    pub threshold_signature: ThresholdSignature,
}

impl QuorumCertificate {
    /// Verify the certificate against a validator set: every partial
    /// must come from a distinct known validator and verify over the
    /// vote bytes for this certificate's tuple, and the distinct count
    /// must exceed ⌊2N/3⌋.
    pub fn validate(&self, validators: &ValidatorSet) -> Result<(), CertificateError> {
        let payload = signable_bytes(
            MessageType::Vote,
            self.height,
            self.step,
            self.round,
            Some(self.block.hash()),
        );

        let mut seen: HashSet<Address> = HashSet::new();
        for partial in self.threshold_signature.iter() {
            let validator = validators
                .get_by_address(&partial.address)
                .ok_or(CertificateError::UnknownSigner {
                    address: partial.address,
                })?;
            if !validator.public_key.verify(&payload, &partial.signature) {
                return Err(CertificateError::InvalidPartial {
                    address: partial.address,
                });
            }
            seen.insert(partial.address);
        }

        if !validators.quorum_met(seen.len()) {
            return Err(CertificateError::QuorumNotMet {
                have: seen.len(),
                total: validators.len(),
            });
        }
        Ok(())
    }
}
