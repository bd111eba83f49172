// chain/src/types/tx.rs

//! Transaction types, hashing and self-verification.
//!
//! A transaction is immutable once signed. Hashing happens in three
//! stages, each over the canonical encoding of a growing view:
//!
//! 1. the **content hash** covers the payload (times, gas, actions,
//!    declared signers) — each signer signs this digest;
//! 2. the **publish hash** additionally covers the signer signatures —
//!    the publisher signs this digest;
//! 3. the **tx hash** covers the full encoding including the publisher
//!    signature and is the identity of the transaction everywhere else
//!    (pool keys, block indexes, receipts).

use serde::{Deserialize, Serialize};

use super::codec::{self, CodecError};
use super::{Algorithm, Hash256, PublicKey, Signature};

/// A single invocation of a contract ABI entry.
///
/// `data` carries the serialized arguments; the execution layer defines
/// the argument encoding (the native token engine uses a JSON array).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Contract identifier, e.g. `"token.chain"`.
    pub contract: String,
    /// ABI entry to invoke, e.g. `"transfer"`.
    pub action_name: String,
    /// Serialized arguments.
    pub data: String,
}

impl Action {
    pub fn new(
        contract: impl Into<String>,
        action_name: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            contract: contract.into(),
            action_name: action_name.into(),
            data: data.into(),
        }
    }
}

/// Errors from [`Tx::verify_self`].
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    /// The declared signer set is empty.
    #[error("transaction declares no signers")]
    NoSigner,
    /// A carried signature does not verify over the content hash.
    #[error("signer signature does not verify")]
    BadSignature,
    /// A declared signer has no verifying signature.
    #[error("no signature for declared signer")]
    MissingSignerSignature,
    /// The publisher signature does not verify over the publish hash.
    #[error("publisher signature does not verify")]
    BadPublisher,
}

/// Serialization view for the content hash: payload without signatures.
#[derive(Serialize)]
struct TxBaseView<'a> {
    time: i64,
    expiration: i64,
    gas_price: u64,
    gas_limit: u64,
    actions: &'a [Action],
    signers: &'a [PublicKey],
}

/// Serialization view for the publish hash: payload + signer signatures.
#[derive(Serialize)]
struct TxPublishView<'a> {
    time: i64,
    expiration: i64,
    gas_price: u64,
    gas_limit: u64,
    actions: &'a [Action],
    signers: &'a [PublicKey],
    signs: &'a [Signature],
}

/// A signed transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    /// Sender wall clock at creation, nanoseconds since epoch.
    pub time: i64,
    /// Absolute expiry, nanoseconds since epoch.
    pub expiration: i64,
    /// Price the publisher pays per unit of gas; the pool orders by this.
    pub gas_price: u64,
    /// Upper bound on gas this transaction may consume.
    pub gas_limit: u64,
    /// Ordered list of contract invocations.
    pub actions: Vec<Action>,
    /// Public keys that must co-sign the content hash.
    pub signers: Vec<PublicKey>,
    /// Signatures over the content hash, one (or more) per signer.
    pub signs: Vec<Signature>,
    /// Publisher signature over the publish hash.
    pub publisher: Signature,
}

impl Tx {
    /// Creates an unsigned transaction; use [`Tx::sign_content`] and
    /// [`Tx::publish`] to complete it.
    pub fn new(
        time: i64,
        expiration: i64,
        gas_price: u64,
        gas_limit: u64,
        actions: Vec<Action>,
        signers: Vec<PublicKey>,
    ) -> Self {
        Self {
            time,
            expiration,
            gas_price,
            gas_limit,
            actions,
            signers,
            signs: Vec::new(),
            publisher: Signature::default(),
        }
    }

    fn base_view(&self) -> TxBaseView<'_> {
        TxBaseView {
            time: self.time,
            expiration: self.expiration,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            actions: &self.actions,
            signers: &self.signers,
        }
    }

    fn publish_view(&self) -> TxPublishView<'_> {
        TxPublishView {
            time: self.time,
            expiration: self.expiration,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            actions: &self.actions,
            signers: &self.signers,
            signs: &self.signs,
        }
    }

    /// Digest signed by each declared signer.
    pub fn content_hash(&self) -> Result<Hash256, CodecError> {
        Ok(Hash256::compute(&codec::encode(&self.base_view())?))
    }

    /// Digest signed by the publisher.
    pub fn publish_hash(&self) -> Result<Hash256, CodecError> {
        Ok(Hash256::compute(&codec::encode(&self.publish_view())?))
    }

    /// Canonical bytes of the full transaction, publisher included.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decodes a transaction from canonical bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }

    /// The transaction identity: BLAKE3 over the full canonical bytes.
    pub fn hash(&self) -> Hash256 {
        // The struct is plain data; encoding only fails on resource
        // exhaustion, in which case hashing is the least of our problems.
        let bytes = self.canonical_bytes().unwrap_or_default();
        Hash256::compute(&bytes)
    }

    /// Appends a signer signature over the content hash.
    pub fn sign_content(&mut self, seckey: &[u8]) -> Result<(), TxError> {
        let digest = self.content_hash().map_err(|_| TxError::BadSignature)?;
        let sig = Signature::sign(Algorithm::Ed25519, digest.as_bytes(), seckey)
            .map_err(|_| TxError::BadSignature)?;
        self.signs.push(sig);
        Ok(())
    }

    /// Signs as publisher, finalizing the transaction.
    pub fn publish(&mut self, seckey: &[u8]) -> Result<(), TxError> {
        let digest = self.publish_hash().map_err(|_| TxError::BadPublisher)?;
        self.publisher = Signature::sign(Algorithm::Ed25519, digest.as_bytes(), seckey)
            .map_err(|_| TxError::BadPublisher)?;
        Ok(())
    }

    /// Structural signature check, independent of any chain state.
    ///
    /// Passes iff the signer set is non-empty, every carried signature
    /// verifies over the content hash, every declared signer is covered
    /// by at least one of them, and the publisher signature verifies
    /// over the publish hash.
    pub fn verify_self(&self) -> Result<(), TxError> {
        if self.signers.is_empty() {
            return Err(TxError::NoSigner);
        }
        let content = self.content_hash().map_err(|_| TxError::BadSignature)?;
        for sig in &self.signs {
            if !sig.verify(content.as_bytes()) {
                return Err(TxError::BadSignature);
            }
        }
        for signer in &self.signers {
            let covered = self
                .signs
                .iter()
                .any(|sig| sig.pubkey == signer.as_bytes());
            if !covered {
                return Err(TxError::MissingSignerSignature);
            }
        }
        let publish = self.publish_hash().map_err(|_| TxError::BadPublisher)?;
        if !self.publisher.verify(publish.as_bytes()) {
            return Err(TxError::BadPublisher);
        }
        Ok(())
    }

    /// Expiry relative to reference time `now_ns`: a transaction is dead
    /// once it has outlived `lifetime_ns` or passed its own expiration.
    pub fn expired(&self, now_ns: i64, lifetime_ns: i64) -> bool {
        now_ns - self.time > lifetime_ns || now_ns > self.expiration
    }
}

/// Outcome of executing one transaction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Hash of the executed transaction.
    pub tx_hash: Hash256,
    /// Gas consumed by the execution.
    pub gas_usage: u64,
    /// Status code; zero means success.
    pub status_code: i32,
    /// Human-readable status detail, empty on success.
    pub message: String,
    /// Number of actions that executed successfully.
    pub succ_action_num: u32,
}

impl TxReceipt {
    /// Receipt for a fully successful execution.
    pub fn success(tx_hash: Hash256, gas_usage: u64, succ_action_num: u32) -> Self {
        Self {
            tx_hash,
            gas_usage,
            status_code: 0,
            message: String::new(),
            succ_action_num,
        }
    }

    /// Content hash of the receipt, used as a merkle leaf.
    pub fn hash(&self) -> Hash256 {
        let bytes = codec::encode(self).unwrap_or_default();
        Hash256::compute(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC_A: [u8; 32] = [11u8; 32];
    const SEC_B: [u8; 32] = [22u8; 32];

    fn pubkey_of(seckey: &[u8; 32]) -> PublicKey {
        let sk = ed25519_dalek::SigningKey::from_bytes(seckey);
        PublicKey(sk.verifying_key().to_bytes().to_vec())
    }

    fn sample_tx() -> Tx {
        Tx::new(
            1_700_000_000_000_000_000,
            1_700_000_090_000_000_000,
            2,
            10_000,
            vec![Action::new("token.chain", "transfer", r#"["a","b","10"]"#)],
            vec![pubkey_of(&SEC_A)],
        )
    }

    #[test]
    fn fully_signed_tx_verifies() {
        let mut tx = sample_tx();
        tx.sign_content(&SEC_A).expect("signer");
        tx.publish(&SEC_B).expect("publisher");
        tx.verify_self().expect("verify_self");
    }

    #[test]
    fn missing_signer_signature_is_rejected() {
        let mut tx = sample_tx();
        tx.publish(&SEC_B).expect("publisher");
        assert!(matches!(
            tx.verify_self(),
            Err(TxError::MissingSignerSignature)
        ));
    }

    #[test]
    fn empty_signer_set_is_rejected() {
        let mut tx = sample_tx();
        tx.signers.clear();
        tx.publish(&SEC_B).expect("publisher");
        assert!(matches!(tx.verify_self(), Err(TxError::NoSigner)));
    }

    #[test]
    fn tampering_after_publish_breaks_verification() {
        let mut tx = sample_tx();
        tx.sign_content(&SEC_A).expect("signer");
        tx.publish(&SEC_B).expect("publisher");

        let mut tampered = tx.clone();
        tampered.gas_price = 999;
        assert!(tampered.verify_self().is_err());
    }

    #[test]
    fn hash_covers_publisher_signature() {
        let mut tx = sample_tx();
        tx.sign_content(&SEC_A).expect("signer");
        let before = tx.hash();
        tx.publish(&SEC_B).expect("publisher");
        assert_ne!(before, tx.hash());
    }

    #[test]
    fn roundtrip_preserves_hash() {
        let mut tx = sample_tx();
        tx.sign_content(&SEC_A).expect("signer");
        tx.publish(&SEC_B).expect("publisher");

        let bytes = tx.canonical_bytes().expect("encode");
        let decoded = Tx::decode(&bytes).expect("decode");
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn expiry_relative_to_reference_time() {
        let tx = sample_tx();
        let lifetime = 90_000_000_000i64; // 90 s

        // Fresh relative to its own time.
        assert!(!tx.expired(tx.time + 1_000_000_000, lifetime));
        // Outlived the lifetime window.
        assert!(tx.expired(tx.time + lifetime + 1, lifetime));
        // Past its absolute expiration.
        assert!(tx.expired(tx.expiration + 1, i64::MAX));
    }
}
