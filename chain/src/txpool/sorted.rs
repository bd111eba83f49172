//! Priority-ordered pending transaction set.
//!
//! A `SortedTxMap` keeps pending transactions in a `BTreeMap` whose key
//! sorts by gas price descending, then submission time ascending, with
//! the transaction hash as a final disambiguator. Forward iteration over
//! the tree therefore yields transactions in inclusion-priority order.
//! A secondary hash index gives O(1) membership checks and deletions.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::types::{Hash256, Tx};

/// Ordering key: higher gas price first, earlier submission breaks ties.
#[derive(Clone, Debug, Eq, PartialEq)]
struct OrderKey {
    gas_price: u64,
    time: i64,
    hash: Hash256,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .gas_price
            .cmp(&self.gas_price)
            .then(self.time.cmp(&other.time))
            .then(self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn key_of(hash: Hash256, tx: &Tx) -> OrderKey {
    OrderKey {
        gas_price: tx.gas_price,
        time: tx.time,
        hash,
    }
}

/// Pending set with priority ordering and a hash index.
#[derive(Default)]
pub struct SortedTxMap {
    tree: BTreeMap<OrderKey, Arc<Tx>>,
    by_hash: HashMap<Hash256, OrderKey>,
}

impl SortedTxMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<Arc<Tx>> {
        let key = self.by_hash.get(hash)?;
        self.tree.get(key).cloned()
    }

    /// Inserts a transaction; returns `false` if its hash is already
    /// present (the original is kept).
    pub fn add(&mut self, tx: Arc<Tx>) -> bool {
        let hash = tx.hash();
        if self.by_hash.contains_key(&hash) {
            return false;
        }
        let key = key_of(hash, &tx);
        self.by_hash.insert(hash, key.clone());
        self.tree.insert(key, tx);
        true
    }

    /// Removes by hash, returning the transaction if it was pending.
    pub fn del(&mut self, hash: &Hash256) -> Option<Arc<Tx>> {
        let key = self.by_hash.remove(hash)?;
        self.tree.remove(&key)
    }

    /// Clears the whole pending set.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.by_hash.clear();
    }

    /// Snapshot of the pending set in priority order.
    ///
    /// Cloning the `Arc`s decouples iteration from the lock protecting
    /// this map, so readers never block writers for more than the copy.
    pub fn snapshot(&self) -> Vec<Arc<Tx>> {
        self.tree.values().cloned().collect()
    }

    /// Removes and returns the hashes of every transaction that is
    /// expired relative to `now_ns` under `lifetime_ns`.
    pub fn drain_expired(&mut self, now_ns: i64, lifetime_ns: i64) -> Vec<Hash256> {
        let dead: Vec<Hash256> = self
            .tree
            .iter()
            .filter(|(_, tx)| tx.expired(now_ns, lifetime_ns))
            .map(|(key, _)| key.hash)
            .collect();
        for hash in &dead {
            self.del(hash);
        }
        dead
    }
}
