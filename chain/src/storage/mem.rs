//! In-memory block store.
//!
//! Keeps all finalized blocks in maps behind a single `RwLock`. Useful
//! for unit tests, simulations and small devnets.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Block, BlockHash, Hash256, TxReceipt};

use super::{BlockStore, StorageError};

#[derive(Default)]
struct Inner {
    by_hash: HashMap<BlockHash, Block>,
    by_number: Vec<BlockHash>,
    receipts: HashMap<Hash256, TxReceipt>,
}

/// In-memory implementation of [`BlockStore`].
#[derive(Default)]
pub struct InMemoryBlockStore {
    inner: RwLock<Inner>,
}

impl InMemoryBlockStore {
    /// Creates a new, empty in-memory block store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn push(&self, block: &Block) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let number = block.head.number;
        let expected = inner.by_number.len() as u64;
        if number < expected {
            // Already finalized; flushing the same root twice is benign.
            return Ok(());
        }
        if number != expected {
            return Err(StorageError::OutOfOrder {
                expected,
                got: number,
            });
        }
        let hash = block.hash();
        inner.by_number.push(hash);
        for (tx, receipt) in block.txs.iter().zip(&block.receipts) {
            inner.receipts.insert(tx.hash(), receipt.clone());
        }
        inner.by_hash.insert(hash, block.clone());
        Ok(())
    }

    fn length(&self) -> u64 {
        self.inner.read().by_number.len() as u64
    }

    fn top(&self) -> Result<Block, StorageError> {
        let inner = self.inner.read();
        let hash = inner.by_number.last().ok_or(StorageError::NotFound)?;
        inner.by_hash.get(hash).cloned().ok_or(StorageError::NotFound)
    }

    fn get_hash_by_number(&self, number: u64) -> Result<BlockHash, StorageError> {
        self.inner
            .read()
            .by_number
            .get(number as usize)
            .copied()
            .ok_or(StorageError::NotFound)
    }

    fn get_block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        let hash = self.get_hash_by_number(number)?;
        self.get_block_by_hash(&hash)
    }

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, StorageError> {
        self.inner
            .read()
            .by_hash
            .get(hash)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn has_tx(&self, tx_hash: &Hash256) -> Result<bool, StorageError> {
        Ok(self.inner.read().receipts.contains_key(tx_hash))
    }

    fn get_receipt_by_tx_hash(&self, tx_hash: &Hash256) -> Result<TxReceipt, StorageError> {
        self.inner
            .read()
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or(StorageError::NotFound)
    }
}
