//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, signatures and the canonical
//! serialization configuration that are shared across the chain
//! implementation. The goal is to avoid "naked" byte buffers in public
//! APIs and instead use domain-specific newtypes.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

use ed25519_dalek::{Signer, Verifier};

/// Block types, header signing and hashing.
pub mod block;
/// Canonical codec helpers (bincode 2 with an explicit configuration).
pub mod codec;
/// Transaction types, hashing and self-verification.
pub mod tx;

pub use block::{Block, BlockHash, BlockHead};
pub use tx::{Action, Tx, TxReceipt};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// This type is used as the backing representation for all fixed-size
/// hashes in the chain (transaction hashes, block hashes, merkle nodes).
/// It is always exactly [`HASH_LEN`] bytes long. The derived `Ord` is a
/// byte-lexicographic order, which the fork-choice rule relies on for
/// deterministic tie-breaking.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not**
    /// a password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Hex encoding of the hash, used for state-store tags and logging.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns `true` if every byte is zero (the conventional "no parent"
    /// hash of the genesis block).
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }
}

/// Ed25519 public key bytes, wrapped to avoid naked `Vec<u8>`.
///
/// This type is intentionally opaque: it does not interpret or validate
/// the key material, it only carries it through the API in a structured
/// way. Validation happens when a signature is verified against it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Signature algorithm tag.
///
/// Encoded on the wire as a single byte, per the signature layout
/// `(algorithm:u8, sig_bytes:var, pubkey_bytes:var)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Algorithm {
    /// Ed25519 over the BLAKE3-256 digest of the signed content.
    Ed25519,
}

impl Algorithm {
    fn to_u8(self) -> u8 {
        match self {
            Algorithm::Ed25519 => 1,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Algorithm::Ed25519),
            _ => None,
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.to_u8())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = u8::deserialize(deserializer)?;
        Algorithm::from_u8(v)
            .ok_or_else(|| D::Error::custom(format!("unknown signature algorithm tag {v}")))
    }
}

/// Errors from signing and verification primitives.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Secret key bytes have the wrong length for the algorithm.
    #[error("secret key must be {expected} bytes, got {got}")]
    SeckeyLength { expected: usize, got: usize },
    /// Public key bytes are malformed for the algorithm.
    #[error("malformed public key")]
    MalformedPubkey,
}

/// Algorithm-tagged detached signature with an embedded public key.
///
/// The wire layout is `(algorithm:u8, sig_bytes:var, pubkey_bytes:var)`;
/// both variable-width fields are length-prefixed by the canonical codec.
/// A default-constructed signature has no algorithm tag and never
/// verifies; it is the placeholder carried by not-yet-signed values.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    /// Algorithm tag, absent on unsigned placeholders.
    pub algorithm: Option<Algorithm>,
    /// Raw signature bytes as produced by the algorithm.
    pub sig: Vec<u8>,
    /// Public key under which `sig` verifies.
    pub pubkey: Vec<u8>,
}

impl Signature {
    /// Signs `info` (normally a 32-byte digest) with `seckey`, embedding
    /// the derived public key so verifiers need no side channel.
    pub fn sign(algorithm: Algorithm, info: &[u8], seckey: &[u8]) -> Result<Self, CryptoError> {
        match algorithm {
            Algorithm::Ed25519 => {
                let bytes: [u8; ed25519_dalek::SECRET_KEY_LENGTH] =
                    seckey.try_into().map_err(|_| CryptoError::SeckeyLength {
                        expected: ed25519_dalek::SECRET_KEY_LENGTH,
                        got: seckey.len(),
                    })?;
                let signing_key = ed25519_dalek::SigningKey::from_bytes(&bytes);
                let sig = signing_key.sign(info);
                Ok(Signature {
                    algorithm: Some(Algorithm::Ed25519),
                    sig: sig.to_bytes().to_vec(),
                    pubkey: signing_key.verifying_key().to_bytes().to_vec(),
                })
            }
        }
    }

    /// Verifies this signature over `info` under the embedded public key.
    ///
    /// Malformed keys or signature bytes simply fail verification; they
    /// are indistinguishable from a wrong signature to callers.
    pub fn verify(&self, info: &[u8]) -> bool {
        match self.algorithm {
            Some(Algorithm::Ed25519) => {
                let Ok(pk_bytes) = <[u8; ed25519_dalek::PUBLIC_KEY_LENGTH]>::try_from(
                    self.pubkey.as_slice(),
                ) else {
                    return false;
                };
                let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(&pk_bytes) else {
                    return false;
                };
                let Ok(sig_bytes) =
                    <[u8; ed25519_dalek::SIGNATURE_LENGTH]>::try_from(self.sig.as_slice())
                else {
                    return false;
                };
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                vk.verify(info, &sig).is_ok()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash256_is_deterministic() {
        let a = Hash256::compute(b"slot 42");
        let b = Hash256::compute(b"slot 42");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::compute(b"slot 43"));
    }

    #[test]
    fn zero_hash_is_default() {
        assert!(Hash256::default().is_zero());
        assert!(!Hash256::compute(b"x").is_zero());
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let seckey = [7u8; 32];
        let info = Hash256::compute(b"payload");
        let sig = Signature::sign(Algorithm::Ed25519, info.as_bytes(), &seckey)
            .expect("signing with a 32-byte seckey");
        assert!(sig.verify(info.as_bytes()));
        assert!(!sig.verify(Hash256::compute(b"other").as_bytes()));
    }

    #[test]
    fn default_signature_never_verifies() {
        let sig = Signature::default();
        assert!(!sig.verify(Hash256::compute(b"anything").as_bytes()));
    }

    #[test]
    fn wrong_seckey_length_is_rejected() {
        let err = Signature::sign(Algorithm::Ed25519, b"info", &[1, 2, 3]).unwrap_err();
        match err {
            CryptoError::SeckeyLength { expected, got } => {
                assert_eq!(expected, 32);
                assert_eq!(got, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn algorithm_tag_roundtrips_through_codec() {
        let bytes = codec::encode(&Algorithm::Ed25519).expect("encode algorithm");
        assert_eq!(bytes, vec![1]);
        let decoded: Algorithm = codec::decode(&bytes).expect("decode algorithm");
        assert_eq!(decoded, Algorithm::Ed25519);
    }
}
