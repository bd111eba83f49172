//! Versioned key/value state store consumed by the consensus core.
//!
//! The core never interprets state contents; it only needs tagged
//! snapshots that line up with block hashes: the state tagged with a
//! block's hash is the state produced by executing that block on top of
//! the state tagged with its parent's hash. Execution engines read and
//! write through the same handle they were given.

use std::collections::HashMap;

pub mod mem;

pub use mem::MemStateStore;

/// Errors surfaced by state-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// `flush` was asked for a tag that was never created.
    #[error("no such tag: {0}")]
    NoSuchTag(String),
    /// `flush` would violate monotonicity: the tag is not a descendant
    /// of the previously flushed tag.
    #[error("tag {0} is not a descendant of the flushed frontier")]
    NotDescendant(String),
}

/// Handle onto a versioned key/value store.
///
/// Each handle owns an isolated working view. `checkout` re-points the
/// view at a previously tagged snapshot, `tag` labels the current view,
/// `fork` produces an independent handle sharing the tag namespace, and
/// `flush` makes a tagged snapshot durable while discarding branches not
/// reachable from it. Flush is monotone: once a tag is flushed, only its
/// descendants can ever be flushed again.
pub trait StateStore: Send {
    /// Reads a key from the working view.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a key into the working view.
    fn put(&mut self, key: &str, value: &str);

    /// Deletes a key from the working view.
    fn del(&mut self, key: &str);

    /// Re-points the working view at a tagged snapshot. Returns `false`
    /// if no such tag exists (the view is left unchanged).
    fn checkout(&mut self, tag: &str) -> bool;

    /// Labels the current working view.
    fn tag(&mut self, tag: &str);

    /// Produces an independent handle sharing the snapshot namespace.
    fn fork(&self) -> Box<dyn StateStore>;

    /// Makes `tag` durable and discards branches not reachable from it.
    fn flush(&mut self, tag: &str) -> Result<(), StateError>;

    /// Full contents of the working view, for diagnostics and tests.
    fn dump(&self) -> HashMap<String, String>;
}
