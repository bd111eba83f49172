//! Storage backends for the finalized chain.
//!
//! This module provides the [`BlockStore`] trait consumed by the
//! consensus core, together with:
//!
//! - an in-memory store ([`mem::InMemoryBlockStore`]) suitable for tests
//!   and devnets,
//! - a RocksDB-backed store ([`rocksdb::RocksDbBlockStore`]) for
//!   persistent validator nodes.
//!
//! Only finalized (irreversible) blocks reach a `BlockStore`; everything
//! above the last-irreversible block lives in the block cache.

use crate::types::codec::CodecError;
use crate::types::{Block, BlockHash, Hash256, TxReceipt};

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryBlockStore;
pub use rocksdb::{RocksDbBlockStore, RocksDbConfig};

/// Storage-level error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested block, hash or receipt is not stored.
    #[error("not found")]
    NotFound,
    /// A push would leave a gap in the number index.
    #[error("out-of-order push: expected number {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
    /// Underlying RocksDB error.
    #[error("rocksdb: {0}")]
    RocksDb(#[from] ::rocksdb::Error),
    /// Stored bytes failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Corrupted or malformed metadata (e.g. a hash with wrong length).
    #[error("corrupted meta: {0}")]
    CorruptedMeta(&'static str),
}

/// Persistent store of the finalized chain.
///
/// Blocks are indexed three ways: by number, by block hash, and by the
/// hashes of the transactions they carry (which also resolves to the
/// transaction's receipt).
pub trait BlockStore: Send + Sync {
    /// Appends a finalized block. Numbers must be contiguous; pushing a
    /// block whose number is already stored is a no-op.
    fn push(&self, block: &Block) -> Result<(), StorageError>;

    /// Number of stored blocks (equals top number + 1 when non-empty).
    fn length(&self) -> u64;

    /// The most recently pushed block.
    fn top(&self) -> Result<Block, StorageError>;

    fn get_hash_by_number(&self, number: u64) -> Result<BlockHash, StorageError>;

    fn get_block_by_number(&self, number: u64) -> Result<Block, StorageError>;

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, StorageError>;

    /// True if a transaction with this hash is on the finalized chain.
    fn has_tx(&self, tx_hash: &Hash256) -> Result<bool, StorageError>;

    fn get_receipt_by_tx_hash(&self, tx_hash: &Hash256) -> Result<TxReceipt, StorageError>;
}
