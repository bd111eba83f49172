// chain/src/account.rs

//! Keypairs and witness identifiers.
//!
//! A witness identifier is a stable string derived from the public key:
//! `"IOST" || base58(pubkey || checksum4(pubkey))` where `checksum4` is
//! the first four bytes of the BLAKE3 digest of the key. The prefix is
//! mandatory; [`id_by_pubkey`] and [`pubkey_by_id`] are inverses.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::types::{Algorithm, CryptoError, Hash256, Signature};

/// Mandatory prefix of every witness identifier.
pub const ID_PREFIX: &str = "IOST";

const CHECKSUM_LEN: usize = 4;

/// Errors from identifier decoding and account construction.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("identifier is missing the {ID_PREFIX} prefix")]
    BadPrefix,
    #[error("identifier is not valid base58")]
    BadBase58,
    #[error("identifier checksum mismatch")]
    BadChecksum,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn checksum4(pubkey: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Hash256::compute(pubkey);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest.as_bytes()[..CHECKSUM_LEN]);
    out
}

/// Derives the witness identifier for a public key.
pub fn id_by_pubkey(pubkey: &[u8]) -> String {
    let mut payload = pubkey.to_vec();
    payload.extend_from_slice(&checksum4(pubkey));
    format!("{}{}", ID_PREFIX, bs58::encode(payload).into_string())
}

/// Recovers the public key from a witness identifier.
pub fn pubkey_by_id(id: &str) -> Result<Vec<u8>, AccountError> {
    let encoded = id.strip_prefix(ID_PREFIX).ok_or(AccountError::BadPrefix)?;
    let payload = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| AccountError::BadBase58)?;
    if payload.len() <= CHECKSUM_LEN {
        return Err(AccountError::BadChecksum);
    }
    let (pubkey, checksum) = payload.split_at(payload.len() - CHECKSUM_LEN);
    if checksum != checksum4(pubkey) {
        return Err(AccountError::BadChecksum);
    }
    Ok(pubkey.to_vec())
}

/// A local identity: witness id, public key and secret key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    /// Witness identifier derived from `pubkey`.
    pub id: String,
    /// Ed25519 public key bytes.
    pub pubkey: Vec<u8>,
    /// Ed25519 secret key bytes. Never serialized to the wire; the
    /// serde impls exist for local key files only.
    pub seckey: Vec<u8>,
}

impl Account {
    /// Creates an account from an existing secret key, or generates a
    /// fresh one from OS randomness when `seckey` is `None`.
    pub fn new(seckey: Option<Vec<u8>>) -> Result<Self, AccountError> {
        let signing_key = match seckey {
            Some(bytes) => {
                let arr: [u8; ed25519_dalek::SECRET_KEY_LENGTH] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| CryptoError::SeckeyLength {
                            expected: ed25519_dalek::SECRET_KEY_LENGTH,
                            got: bytes.len(),
                        })?;
                SigningKey::from_bytes(&arr)
            }
            None => SigningKey::generate(&mut OsRng),
        };
        let pubkey = signing_key.verifying_key().to_bytes().to_vec();
        Ok(Self {
            id: id_by_pubkey(&pubkey),
            pubkey,
            seckey: signing_key.to_bytes().to_vec(),
        })
    }

    /// Imports an account from a base58-encoded secret key.
    pub fn from_base58_seckey(encoded: &str) -> Result<Self, AccountError> {
        let seckey = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| AccountError::BadBase58)?;
        Self::new(Some(seckey))
    }

    /// Signs a digest with this account's secret key.
    pub fn sign(&self, info: &Hash256) -> Result<Signature, CryptoError> {
        Signature::sign(Algorithm::Ed25519, info.as_bytes(), &self.seckey)
    }
}
