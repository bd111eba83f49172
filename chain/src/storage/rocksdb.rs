//! RocksDB-backed block store.
//!
//! This implementation persists the finalized chain in a RocksDB
//! instance with dedicated column families:
//!
//! - `"blocks"`:  maps `BlockHash` (32 bytes) -> canonical block bytes,
//! - `"numbers"`: maps big-endian `u64` -> `BlockHash`,
//! - `"txs"`:     maps tx hash -> canonical receipt bytes,
//! - `"meta"`:    stores the chain length under a fixed key `"length"`.

use std::{path::Path, sync::Arc};

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, Options};

use crate::types::codec;
use crate::types::{Block, BlockHash, HASH_LEN, Hash256, TxReceipt};

use super::{BlockStore, StorageError};

/// Configuration for [`RocksDbBlockStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/chain-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`BlockStore`].
pub struct RocksDbBlockStore {
    db: DB,
}

impl RocksDbBlockStore {
    /// Opens (or creates) a RocksDB-backed block store at the given path.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new("blocks", Options::default()),
            ColumnFamilyDescriptor::new("numbers", Options::default()),
            ColumnFamilyDescriptor::new("txs", Options::default()),
            ColumnFamilyDescriptor::new("meta", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::CorruptedMeta("missing column family"))
    }

    fn load_length(&self) -> Result<u64, StorageError> {
        let cf_meta = self.cf("meta")?;
        match self.db.get_cf(&cf_meta, b"length")? {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| StorageError::CorruptedMeta("length width"))?;
                Ok(u64::from_be_bytes(arr))
            }
        }
    }
}

impl BlockStore for RocksDbBlockStore {
    fn push(&self, block: &Block) -> Result<(), StorageError> {
        let number = block.head.number;
        let expected = self.load_length()?;
        if number < expected {
            return Ok(());
        }
        if number != expected {
            return Err(StorageError::OutOfOrder {
                expected,
                got: number,
            });
        }

        let hash = block.hash();
        let bytes = block.canonical_bytes()?;

        let cf_blocks = self.cf("blocks")?;
        let cf_numbers = self.cf("numbers")?;
        let cf_txs = self.cf("txs")?;
        let cf_meta = self.cf("meta")?;

        let mut batch = rocksdb::WriteBatch::default();
        batch.put_cf(&cf_blocks, hash.0.as_bytes(), &bytes);
        batch.put_cf(&cf_numbers, number.to_be_bytes(), hash.0.as_bytes());
        for (tx, receipt) in block.txs.iter().zip(&block.receipts) {
            batch.put_cf(
                &cf_txs,
                tx.hash().as_bytes(),
                codec::encode(receipt)?,
            );
        }
        batch.put_cf(&cf_meta, b"length", (number + 1).to_be_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.load_length().unwrap_or(0)
    }

    fn top(&self) -> Result<Block, StorageError> {
        let length = self.load_length()?;
        if length == 0 {
            return Err(StorageError::NotFound);
        }
        self.get_block_by_number(length - 1)
    }

    fn get_hash_by_number(&self, number: u64) -> Result<BlockHash, StorageError> {
        let cf_numbers = self.cf("numbers")?;
        let bytes = self
            .db
            .get_cf(&cf_numbers, number.to_be_bytes())?
            .ok_or(StorageError::NotFound)?;
        if bytes.len() != HASH_LEN {
            return Err(StorageError::CorruptedMeta("hash length"));
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Ok(BlockHash(Hash256(arr)))
    }

    fn get_block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        let hash = self.get_hash_by_number(number)?;
        self.get_block_by_hash(&hash)
    }

    fn get_block_by_hash(&self, hash: &BlockHash) -> Result<Block, StorageError> {
        let cf_blocks = self.cf("blocks")?;
        let bytes = self
            .db
            .get_cf(&cf_blocks, hash.0.as_bytes())?
            .ok_or(StorageError::NotFound)?;
        Ok(Block::decode(&bytes)?)
    }

    fn has_tx(&self, tx_hash: &Hash256) -> Result<bool, StorageError> {
        let cf_txs = self.cf("txs")?;
        Ok(self.db.get_cf(&cf_txs, tx_hash.as_bytes())?.is_some())
    }

    fn get_receipt_by_tx_hash(&self, tx_hash: &Hash256) -> Result<TxReceipt, StorageError> {
        let cf_txs = self.cf("txs")?;
        let bytes = self
            .db
            .get_cf(&cf_txs, tx_hash.as_bytes())?
            .ok_or(StorageError::NotFound)?;
        Ok(codec::decode(&bytes)?)
    }
}
