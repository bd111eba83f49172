// chain/src/types/block.rs

//! Block types, header signing and hashing.
//!
//! A block is a header plus an ordered list of transactions and the
//! parallel list of receipts their execution produced. The header commits
//! to both lists (`txs_hash`, `merkle_hash`) and is signed by the witness
//! over a canonical preimage that excludes the signature itself. The
//! **block hash** is the BLAKE3-256 digest of the fully signed header's
//! canonical bytes, so it also changes whenever the signature does.

use serde::{Deserialize, Serialize};

use super::codec::{self, CodecError};
use super::tx::{Tx, TxReceipt};
use super::{Algorithm, CryptoError, Hash256, Signature};

/// Strongly-typed block hash.
///
/// The derived `Ord` is byte-lexicographic and is used by head selection
/// to break ties between blocks of equal number.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockHash(pub Hash256);

impl BlockHash {
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// The conventional "no parent" hash carried by the genesis block.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// Block header.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BlockHead {
    /// Protocol version, currently 0.
    pub version: u64,
    /// Hash of the parent block; all zeroes for genesis.
    pub parent_hash: BlockHash,
    /// Height: `parent.number + 1`, or 0 for genesis.
    pub number: u64,
    /// Identifier of the witness that produced this block.
    pub witness: String,
    /// Slot number the block was produced in (`unix_s / SLOT_LENGTH`).
    pub time: i64,
    /// Commitment to the ordered transaction list.
    pub txs_hash: Hash256,
    /// Merkle root over the receipt list.
    pub merkle_hash: Hash256,
    /// Opaque extension field.
    pub info: Vec<u8>,
    /// Witness signature over [`BlockHead::signing_preimage`].
    pub signature: Signature,
}

/// Serialization view for the signing preimage: every header field in
/// canonical order, signature excluded.
#[derive(Serialize)]
struct HeadPreimageView<'a> {
    version: u64,
    parent_hash: &'a BlockHash,
    number: u64,
    witness: &'a str,
    time: i64,
    txs_hash: &'a Hash256,
    merkle_hash: &'a Hash256,
    info: &'a [u8],
}

impl BlockHead {
    /// Digest the witness signs: BLAKE3 over the canonical encoding of
    /// all header fields except the signature.
    pub fn signing_preimage(&self) -> Result<Hash256, CodecError> {
        let view = HeadPreimageView {
            version: self.version,
            parent_hash: &self.parent_hash,
            number: self.number,
            witness: &self.witness,
            time: self.time,
            txs_hash: &self.txs_hash,
            merkle_hash: &self.merkle_hash,
            info: &self.info,
        };
        Ok(Hash256::compute(&codec::encode(&view)?))
    }

    /// Signs the header in place with the witness secret key.
    pub fn sign(&mut self, seckey: &[u8]) -> Result<(), BlockError> {
        let digest = self.signing_preimage()?;
        self.signature = Signature::sign(Algorithm::Ed25519, digest.as_bytes(), seckey)?;
        Ok(())
    }

    /// Verifies the header signature against the embedded public key.
    ///
    /// Whether that public key belongs to the declared witness is a
    /// consensus-level question answered by the admission pipeline.
    pub fn verify_sig(&self) -> bool {
        match self.signing_preimage() {
            Ok(digest) => self.signature.verify(digest.as_bytes()),
            Err(_) => false,
        }
    }

    /// Canonical bytes of the signed header.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// The block hash: digest of the fully signed header.
    pub fn hash(&self) -> BlockHash {
        let bytes = self.canonical_bytes().unwrap_or_default();
        BlockHash(Hash256::compute(&bytes))
    }
}

/// Errors from block construction and decoding.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// The header commitment does not match the carried transaction list.
    #[error("txs_hash does not match transaction list")]
    TxsHashMismatch,
    /// The header commitment does not match the carried receipt list.
    #[error("merkle_hash does not match receipt list")]
    MerkleHashMismatch,
}

/// Block = header + transactions + receipts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub head: BlockHead,
    /// Ordered list of transactions included in this block.
    pub txs: Vec<Tx>,
    /// Receipts of `txs`, index-parallel.
    pub receipts: Vec<TxReceipt>,
}

impl Block {
    /// Canonical byte representation of the whole block (wire format).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decodes a block from canonical bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }

    /// The block hash (header hash).
    pub fn hash(&self) -> BlockHash {
        self.head.hash()
    }

    /// Commitment over the ordered transaction list: BLAKE3 of the
    /// concatenated transaction hashes.
    pub fn calculate_txs_hash(&self) -> Hash256 {
        let mut buf = Vec::with_capacity(self.txs.len() * super::HASH_LEN);
        for tx in &self.txs {
            buf.extend_from_slice(tx.hash().as_bytes());
        }
        Hash256::compute(&buf)
    }

    /// Merkle root over the receipt hashes.
    pub fn calculate_merkle_hash(&self) -> Hash256 {
        let leaves: Vec<Hash256> = self.receipts.iter().map(TxReceipt::hash).collect();
        merkle_root(&leaves)
    }

    /// Checks the header commitments against the carried lists.
    pub fn verify_integrity(&self) -> Result<(), BlockError> {
        if self.calculate_txs_hash() != self.head.txs_hash {
            return Err(BlockError::TxsHashMismatch);
        }
        if self.calculate_merkle_hash() != self.head.merkle_hash {
            return Err(BlockError::MerkleHashMismatch);
        }
        Ok(())
    }
}

/// Binary merkle root with odd levels closed by duplicating the last
/// node. An empty leaf set roots to the zero hash.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::default();
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut buf = [0u8; super::HASH_LEN * 2];
            buf[..super::HASH_LEN].copy_from_slice(left.as_bytes());
            buf[super::HASH_LEN..].copy_from_slice(right.as_bytes());
            next.push(Hash256::compute(&buf));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PublicKey;
    use crate::types::tx::Action;

    const WITNESS_SEC: [u8; 32] = [5u8; 32];

    fn dummy_tx(byte: u8) -> Tx {
        let sec = [byte; 32];
        let sk = ed25519_dalek::SigningKey::from_bytes(&sec);
        let pubkey = PublicKey(sk.verifying_key().to_bytes().to_vec());
        let mut tx = Tx::new(
            1_700_000_000_000_000_000 + byte as i64,
            1_700_000_090_000_000_000,
            1,
            1_000,
            vec![Action::new("token.chain", "transfer", r#"["a","b","1"]"#)],
            vec![pubkey],
        );
        tx.sign_content(&sec).expect("sign content");
        tx.publish(&sec).expect("publish");
        tx
    }

    fn sample_block() -> Block {
        let txs = vec![dummy_tx(1), dummy_tx(2)];
        let receipts: Vec<TxReceipt> = txs
            .iter()
            .map(|t| TxReceipt::success(t.hash(), 100, 1))
            .collect();
        let mut block = Block {
            head: BlockHead {
                version: 0,
                parent_hash: BlockHash(Hash256::compute(b"parent")),
                number: 3,
                witness: "w1".to_string(),
                time: 566_666_666,
                txs_hash: Hash256::default(),
                merkle_hash: Hash256::default(),
                info: Vec::new(),
                signature: Signature::default(),
            },
            txs,
            receipts,
        };
        block.head.txs_hash = block.calculate_txs_hash();
        block.head.merkle_hash = block.calculate_merkle_hash();
        block.head.sign(&WITNESS_SEC).expect("sign head");
        block
    }

    #[test]
    fn signed_header_verifies() {
        let block = sample_block();
        assert!(block.head.verify_sig());
    }

    #[test]
    fn tampered_header_fails_verification() {
        let mut block = sample_block();
        block.head.number += 1;
        assert!(!block.head.verify_sig());
    }

    #[test]
    fn block_hash_covers_signature() {
        let mut block = sample_block();
        let h1 = block.hash();
        block.head.sign(&[9u8; 32]).expect("re-sign");
        assert_ne!(h1, block.hash());
    }

    #[test]
    fn roundtrip_preserves_block_hash() {
        let block = sample_block();
        let bytes = block.canonical_bytes().expect("encode");
        let decoded = Block::decode(&bytes).expect("decode");
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
        // Re-encoding the decoded block is bit-exact.
        assert_eq!(decoded.canonical_bytes().expect("re-encode"), bytes);
    }

    #[test]
    fn integrity_check_catches_tx_swap() {
        let mut block = sample_block();
        block.verify_integrity().expect("commitments match");
        block.txs.push(dummy_tx(3));
        assert!(matches!(
            block.verify_integrity(),
            Err(BlockError::TxsHashMismatch)
        ));
    }

    #[test]
    fn merkle_root_of_empty_is_zero() {
        assert!(merkle_root(&[]).is_zero());
    }

    #[test]
    fn merkle_root_handles_odd_leaf_count() {
        let leaves = vec![
            Hash256::compute(b"r1"),
            Hash256::compute(b"r2"),
            Hash256::compute(b"r3"),
        ];
        let root = merkle_root(&leaves);
        assert!(!root.is_zero());
        // Dependent on leaf order.
        let mut reversed = leaves.clone();
        reversed.reverse();
        assert_ne!(root, merkle_root(&reversed));
    }
}
