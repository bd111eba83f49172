//! In-memory state store.
//!
//! Snapshots are whole-map clones kept in a tag table shared between all
//! forked handles. This is plenty for unit tests, devnets and the demo
//! node; a production deployment would put a persistent MVCC store
//! behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{StateError, StateStore};

#[derive(Clone)]
struct Snapshot {
    data: HashMap<String, String>,
    /// Tag this snapshot was created on top of, if any. Forms the
    /// ancestry used by `flush` reachability and monotonicity checks.
    parent: Option<String>,
}

#[derive(Default)]
struct Shared {
    tags: HashMap<String, Snapshot>,
    flushed: Option<String>,
}

impl Shared {
    /// Walks parent links from `tag`; true if the walk passes `ancestor`.
    fn descends_from(&self, tag: &str, ancestor: &str) -> bool {
        let mut cur = Some(tag.to_string());
        while let Some(t) = cur {
            if t == ancestor {
                return true;
            }
            cur = self.tags.get(&t).and_then(|s| s.parent.clone());
        }
        false
    }
}

/// In-memory implementation of [`StateStore`].
pub struct MemStateStore {
    shared: Arc<Mutex<Shared>>,
    working: HashMap<String, String>,
    /// Tag the working view was last checked out from or tagged as.
    base: Option<String>,
}

impl MemStateStore {
    /// Creates an empty store with a fresh tag namespace.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            working: HashMap::new(),
            base: None,
        }
    }
}

impl Default for MemStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.working.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.working.insert(key.to_string(), value.to_string());
    }

    fn del(&mut self, key: &str) {
        self.working.remove(key);
    }

    fn checkout(&mut self, tag: &str) -> bool {
        let shared = self.shared.lock();
        match shared.tags.get(tag) {
            Some(snapshot) => {
                self.working = snapshot.data.clone();
                self.base = Some(tag.to_string());
                true
            }
            None => false,
        }
    }

    fn tag(&mut self, tag: &str) {
        let mut shared = self.shared.lock();
        shared.tags.insert(
            tag.to_string(),
            Snapshot {
                data: self.working.clone(),
                parent: self.base.clone(),
            },
        );
        self.base = Some(tag.to_string());
    }

    fn fork(&self) -> Box<dyn StateStore> {
        Box::new(MemStateStore {
            shared: Arc::clone(&self.shared),
            working: self.working.clone(),
            base: self.base.clone(),
        })
    }

    fn flush(&mut self, tag: &str) -> Result<(), StateError> {
        let mut shared = self.shared.lock();
        if !shared.tags.contains_key(tag) {
            return Err(StateError::NoSuchTag(tag.to_string()));
        }
        if let Some(flushed) = shared.flushed.clone() {
            if !shared.descends_from(tag, &flushed) {
                return Err(StateError::NotDescendant(tag.to_string()));
            }
        }
        // Keep the flushed tag and everything that descends from it.
        let keep: Vec<String> = shared
            .tags
            .keys()
            .filter(|t| shared.descends_from(t, tag))
            .cloned()
            .collect();
        shared.tags.retain(|t, _| keep.contains(t));
        shared.flushed = Some(tag.to_string());
        Ok(())
    }

    fn dump(&self) -> HashMap<String, String> {
        self.working.clone()
    }
}
