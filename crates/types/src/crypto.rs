//! Ed25519 key and signature wrappers.
//!
//! Verification is total: malformed keys or signatures yield `false`,
//! never a panic. Consensus treats an unverifiable signature the same
//! way it treats an invalid one.

use crate::identifiers::Address;
use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid key material")]
    InvalidKey,
}

/// An ed25519 signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the given RNG.
    pub fn generate<R: rand::CryptoRng + rand::RngCore>(rng: &mut R) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Derive a keypair from a 32-byte seed. Deterministic; used for
    /// tests and for loading a configured validator key.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidKey)?;
        Ok(Self::from_seed(seed))
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// The validator address derived from this key.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        write!(f, "KeyPair({})", self.address())
    }
}

/// An ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Parse a hex-encoded public key.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s)?;
        let raw: [u8; 32] = bytes.try_into().map_err(|_| KeyError::InvalidKey)?;
        // Reject points that are not on the curve up front.
        ed25519_dalek::VerifyingKey::from_bytes(&raw).map_err(|_| KeyError::InvalidKey)?;
        Ok(PublicKey(raw))
    }

    /// Verify `signature` over `message`. Returns `false` for malformed
    /// key material or empty signatures.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The address derived from this key: the first 20 bytes of the
    /// SHA-256 of the key bytes.
    pub fn address(&self) -> Address {
        let digest = crate::Hash::from_bytes(&self.0);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.as_bytes()[..20]);
        Address::new(out)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// A 64-byte ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes_64")] [u8; 64]);

impl Signature {
    /// The all-zero signature, only useful as a placeholder in tests.
    pub fn zero() -> Self {
        Signature([0u8; 64])
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_raw(raw: [u8; 64]) -> Self {
        Signature(raw)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..8]))
    }
}

/// Serde does not derive for `[u8; 64]`; encode as a byte sequence.
mod serde_bytes_64 {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; 64], D::Error> {
        let v: Vec<u8> = Vec::deserialize(de)?;
        v.try_into()
            .map_err(|_| D::Error::custom("expected 64 bytes"))
    }
}
