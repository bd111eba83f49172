//! Global consensus state: witness schedule, watermarks, slot bookkeeping.
//!
//! A `StaticProperty` is owned by the admission loop; the producer and
//! RPC surfaces read through a shared lock. It tracks:
//!
//! - the ordered active witness set and the local node's identity,
//! - per-witness **watermarks** (one past the highest block number each
//!   witness has confirmed by building on top of it),
//! - which slots are already occupied by a cached block, enforcing the
//!   one-block-per-slot rule.

use std::collections::{HashMap, HashSet};

/// Slot number for a unix timestamp in seconds.
pub fn slot_of_unix_sec(unix_sec: i64, slot_length_sec: u64) -> i64 {
    unix_sec / slot_length_sec as i64
}

pub struct StaticProperty {
    /// Identity of the local node.
    pub account_id: String,
    /// Ordered active witness set.
    pub witness_list: Vec<String>,
    /// Per-witness confirmation frontier.
    pub watermark: HashMap<String, u64>,
    slots: HashSet<i64>,
}

impl StaticProperty {
    pub fn new(account_id: String, witness_list: Vec<String>) -> Self {
        Self {
            account_id,
            witness_list,
            watermark: HashMap::new(),
            slots: HashSet::new(),
        }
    }

    pub fn num_witnesses(&self) -> usize {
        self.witness_list.len()
    }

    /// The 2/3-supermajority threshold: `⌊2·|W|/3⌋ + 1`.
    pub fn confirm_limit(&self) -> i64 {
        (self.witness_list.len() as i64) * 2 / 3 + 1
    }

    pub fn is_witness(&self, id: &str) -> bool {
        self.witness_list.iter().any(|w| w == id)
    }

    /// Deterministic witness rotation: `W[slot mod |W|]`.
    pub fn witness_of_slot(&self, slot: i64) -> Option<&str> {
        if self.witness_list.is_empty() {
            return None;
        }
        let idx = slot.rem_euclid(self.witness_list.len() as i64) as usize;
        Some(&self.witness_list[idx])
    }

    pub fn has_slot(&self, slot: i64) -> bool {
        self.slots.contains(&slot)
    }

    pub fn add_slot(&mut self, slot: i64) {
        self.slots.insert(slot);
    }

    /// Forgets slot occupations at or below the finalized frontier;
    /// nothing below the LIB can legitimately occupy a slot again.
    pub fn prune_slots(&mut self, below: i64) {
        self.slots.retain(|s| *s >= below);
    }

    /// Adopts a new witness set (on LIB advancement past a block whose
    /// pending list changed the schedule).
    pub fn update_witness_list(&mut self, list: Vec<String>) {
        if !list.is_empty() && list != self.witness_list {
            tracing::info!(witnesses = list.len(), "witness set updated");
            self.witness_list = list;
        }
    }
}
