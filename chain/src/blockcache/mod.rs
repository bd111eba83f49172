//! Fork-aware cache of un-finalized blocks.
//!
//! The cache is a tree rooted at the last irreversible block. Nodes are
//! `Linked` when a complete parent path down to the root exists and
//! `Single` while ancestors are still missing. Nodes live in an arena
//! (a slot vector with a free list); parent/child edges are indices, so
//! the tree has no reference cycles and subtree walks are plain index
//! chasing.
//!
//! Head selection is a pure function of the linked node set: the node
//! with the greatest block number wins, ties going to the
//! byte-lexicographically larger block hash.

use std::collections::HashMap;

use crate::types::Block;
use crate::types::block::BlockHash;

/// Index of a node in the cache arena.
pub type NodeIndex = usize;

/// Linkage state of a cached block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeType {
    /// A parent path exists from this node to the cache root.
    Linked,
    /// Some ancestor is still missing.
    Single,
}

/// Record attached to a block while it lives in the cache.
#[derive(Debug)]
pub struct BlockCacheNode {
    pub block: Block,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub node_type: NodeType,
    /// Copy of the block's witness identifier.
    pub witness: String,
    /// The witness's watermark observed when this node was linked.
    pub confirm_until: u64,
    /// Snapshot of the witness set that will govern children.
    pub pending_witness_list: Vec<String>,
}

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("duplicate block")]
    DuplicateBlock,
    #[error("block not found in cache")]
    NotFound,
    #[error("node is not reachable from the cache root")]
    NotLinked,
}

/// The fork tree.
pub struct BlockCache {
    arena: Vec<Option<BlockCacheNode>>,
    free: Vec<NodeIndex>,
    by_hash: HashMap<BlockHash, NodeIndex>,
    /// Children waiting for a parent that has not arrived, keyed by the
    /// missing parent hash.
    orphans: HashMap<BlockHash, Vec<NodeIndex>>,
    root: NodeIndex,
    head: NodeIndex,
}

impl BlockCache {
    /// Creates a cache rooted at the last irreversible block.
    pub fn new(root_block: Block, witness_list: Vec<String>) -> Self {
        let root_hash = root_block.hash();
        let witness = root_block.head.witness.clone();
        let node = BlockCacheNode {
            block: root_block,
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Linked,
            witness,
            confirm_until: 0,
            pending_witness_list: witness_list,
        };
        let mut by_hash = HashMap::new();
        by_hash.insert(root_hash, 0);
        Self {
            arena: vec![Some(node)],
            free: Vec::new(),
            by_hash,
            orphans: HashMap::new(),
            root: 0,
            head: 0,
        }
    }

    fn alloc(&mut self, node: BlockCacheNode) -> NodeIndex {
        match self.free.pop() {
            Some(idx) => {
                self.arena[idx] = Some(node);
                idx
            }
            None => {
                self.arena.push(Some(node));
                self.arena.len() - 1
            }
        }
    }

    /// Borrow a node. Panics on a dangling index, which would be a bug in
    /// the cache itself; external callers only obtain live indices.
    pub fn node(&self, idx: NodeIndex) -> &BlockCacheNode {
        self.arena[idx].as_ref().expect("live cache node")
    }

    /// Mutable borrow of a node.
    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut BlockCacheNode {
        self.arena[idx].as_mut().expect("live cache node")
    }

    /// Convenience accessor for the node's block.
    pub fn block(&self, idx: NodeIndex) -> &Block {
        &self.node(idx).block
    }

    pub fn linked_root(&self) -> NodeIndex {
        self.root
    }

    pub fn head(&self) -> NodeIndex {
        self.head
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    pub fn find(&self, hash: &BlockHash) -> Option<NodeIndex> {
        self.by_hash.get(hash).copied()
    }

    /// `a` beats `b` under the fork-choice score.
    fn better(&self, a: NodeIndex, b: NodeIndex) -> bool {
        let (na, nb) = (self.node(a), self.node(b));
        (na.block.head.number, na.block.hash()) > (nb.block.head.number, nb.block.hash())
    }

    fn recompute_head(&mut self) {
        let mut best = self.root;
        for idx in self.by_hash.values().copied() {
            if self.node(idx).node_type == NodeType::Linked && self.better(idx, best) {
                best = idx;
            }
        }
        self.head = best;
    }

    /// Inserts a block.
    ///
    /// The node starts `Single` unless its parent is already `Linked`, in
    /// which case it is linked immediately; if previously orphaned
    /// children were waiting for this block they are spliced underneath
    /// and promotion cascades through them.
    pub fn add(&mut self, block: Block) -> Result<NodeIndex, CacheError> {
        let hash = block.hash();
        if self.by_hash.contains_key(&hash) {
            return Err(CacheError::DuplicateBlock);
        }
        let parent_hash = block.head.parent_hash;
        let witness = block.head.witness.clone();
        let idx = self.alloc(BlockCacheNode {
            block,
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Single,
            witness,
            confirm_until: 0,
            pending_witness_list: Vec::new(),
        });
        self.by_hash.insert(hash, idx);

        let parent_linked = match self.by_hash.get(&parent_hash).copied() {
            Some(parent) => {
                self.node_mut(idx).parent = Some(parent);
                self.node_mut(parent).children.push(idx);
                self.node(parent).node_type == NodeType::Linked
            }
            None => {
                self.orphans.entry(parent_hash).or_default().push(idx);
                false
            }
        };

        // Splice children that arrived before this block.
        if let Some(waiting) = self.orphans.remove(&hash) {
            for child in waiting {
                self.node_mut(child).parent = Some(idx);
                self.node_mut(idx).children.push(child);
            }
        }

        if parent_linked {
            self.link(idx)?;
        }
        Ok(idx)
    }

    /// Marks a node `Linked` and cascades the promotion through every
    /// `Single` descendant now connected to the root. Head selection is
    /// refreshed along the way.
    pub fn link(&mut self, idx: NodeIndex) -> Result<(), CacheError> {
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            self.node_mut(cur).node_type = NodeType::Linked;
            if self.better(cur, self.head) {
                self.head = cur;
            }
            for child in self.node(cur).children.clone() {
                if self.node(child).node_type == NodeType::Single {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }

    /// Removes a node and its whole subtree (used when verification of a
    /// block fails).
    pub fn del(&mut self, idx: NodeIndex) -> Result<(), CacheError> {
        if self.arena.get(idx).map(Option::is_none).unwrap_or(true) {
            return Err(CacheError::NotFound);
        }
        // Detach from the parent (or the orphan wait list).
        match self.node(idx).parent {
            Some(parent) => {
                self.node_mut(parent).children.retain(|&c| c != idx);
            }
            None => {
                let parent_hash = self.node(idx).block.head.parent_hash;
                if let Some(waiting) = self.orphans.get_mut(&parent_hash) {
                    waiting.retain(|&c| c != idx);
                    if waiting.is_empty() {
                        self.orphans.remove(&parent_hash);
                    }
                }
            }
        }
        self.remove_subtree(idx);
        self.recompute_head();
        Ok(())
    }

    fn remove_subtree(&mut self, idx: NodeIndex) {
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            let node = self.arena[cur].take().expect("live cache node");
            self.by_hash.remove(&node.block.hash());
            self.free.push(cur);
            stack.extend(node.children);
        }
    }

    /// Promotes `new_root` to the new cache root (LIB advancement).
    ///
    /// Every node outside the new root's subtree is removed. Returns the
    /// blocks on the path from the old root (exclusive) up to the new
    /// root (inclusive), oldest first, for the caller to persist.
    pub fn flush(&mut self, new_root: NodeIndex) -> Result<Vec<Block>, CacheError> {
        if self.arena.get(new_root).map(Option::is_none).unwrap_or(true) {
            return Err(CacheError::NotFound);
        }
        if self.node(new_root).node_type != NodeType::Linked {
            return Err(CacheError::NotLinked);
        }

        // Path old root (exclusive) -> new root (inclusive).
        let mut path = Vec::new();
        let mut cur = new_root;
        while cur != self.root {
            path.push(self.node(cur).block.clone());
            cur = self.node(cur).parent.ok_or(CacheError::NotLinked)?;
        }
        path.reverse();

        // Keep exactly the subtree of the new root.
        let mut keep = vec![false; self.arena.len()];
        let mut stack = vec![new_root];
        while let Some(cur) = stack.pop() {
            keep[cur] = true;
            stack.extend(self.node(cur).children.iter().copied());
        }
        for idx in 0..self.arena.len() {
            if keep[idx] {
                continue;
            }
            if let Some(node) = self.arena[idx].take() {
                self.by_hash.remove(&node.block.hash());
                self.free.push(idx);
            }
        }
        // Orphans below the new root can never link again.
        self.orphans.retain(|_, waiting| {
            waiting.retain(|idx| keep.get(*idx).copied().unwrap_or(false));
            !waiting.is_empty()
        });

        self.node_mut(new_root).parent = None;
        self.root = new_root;
        if !keep[self.head] {
            self.recompute_head();
        }
        Ok(path)
    }

    /// Finds a block by number on the head's ancestor chain.
    pub fn get_block_by_number(&self, number: u64) -> Option<&Block> {
        let mut cur = self.head;
        loop {
            let node = self.node(cur);
            if node.block.head.number == number {
                return Some(&node.block);
            }
            if node.block.head.number < number {
                return None;
            }
            cur = node.parent?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::BlockHead;
    use crate::types::{Hash256, Signature};

    fn gen_block(parent: Option<&Block>, witness: &str, number: u64) -> Block {
        let parent_hash = match parent {
            Some(p) => p.hash(),
            // A parent hash nothing will ever resolve to.
            None => BlockHash(Hash256::compute(witness.as_bytes())),
        };
        Block {
            head: BlockHead {
                version: 0,
                parent_hash,
                number,
                witness: witness.to_string(),
                time: number as i64,
                txs_hash: Hash256::default(),
                merkle_hash: Hash256::default(),
                info: Vec::new(),
                signature: Signature::default(),
            },
            txs: Vec::new(),
            receipts: Vec::new(),
        }
    }

    fn root_block() -> Block {
        Block {
            head: BlockHead {
                version: 0,
                parent_hash: BlockHash::default(),
                number: 0,
                witness: "w0".to_string(),
                time: 0,
                txs_hash: Hash256::default(),
                merkle_hash: Hash256::default(),
                info: Vec::new(),
                signature: Signature::default(),
            },
            txs: Vec::new(),
            receipts: Vec::new(),
        }
    }

    fn new_cache() -> (BlockCache, Block) {
        let root = root_block();
        let cache = BlockCache::new(root.clone(), vec!["w1".into(), "w2".into()]);
        (cache, root)
    }

    #[test]
    fn chain_of_adds_advances_head() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let b2 = gen_block(Some(&b1), "w2", 2);

        let i1 = cache.add(b1.clone()).expect("add b1");
        assert_eq!(cache.node(i1).node_type, NodeType::Linked);
        let i2 = cache.add(b2.clone()).expect("add b2");
        assert_eq!(cache.head(), i2);
        assert_eq!(cache.block(cache.head()).hash(), b2.hash());
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        cache.add(b1.clone()).expect("add b1");
        assert!(matches!(cache.add(b1), Err(CacheError::DuplicateBlock)));
    }

    #[test]
    fn orphan_child_is_single_until_parent_arrives() {
        let (mut cache, root) = new_cache();
        let parent = gen_block(Some(&root), "w1", 1);
        let child = gen_block(Some(&parent), "w2", 2);

        let ic = cache.add(child.clone()).expect("add child first");
        assert_eq!(cache.node(ic).node_type, NodeType::Single);
        assert_eq!(cache.head(), cache.linked_root());

        let ip = cache.add(parent.clone()).expect("add parent");
        assert_eq!(cache.node(ip).node_type, NodeType::Linked);
        assert_eq!(cache.node(ic).node_type, NodeType::Linked);
        // Head advanced through the cascade to the child.
        assert_eq!(cache.head(), ic);
    }

    #[test]
    fn head_ties_break_by_larger_hash() {
        let (mut cache, root) = new_cache();
        let a = gen_block(Some(&root), "wa", 1);
        let b = gen_block(Some(&root), "wb", 1);
        let ia = cache.add(a.clone()).expect("add a");
        let ib = cache.add(b.clone()).expect("add b");

        let expected = if a.hash() > b.hash() { ia } else { ib };
        assert_eq!(cache.head(), expected);
    }

    #[test]
    fn del_removes_whole_subtree() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let b2 = gen_block(Some(&b1), "w2", 2);
        let i1 = cache.add(b1.clone()).expect("add b1");
        let i2 = cache.add(b2.clone()).expect("add b2");
        assert_eq!(cache.head(), i2);

        cache.del(i1).expect("del b1");
        assert!(cache.find(&b1.hash()).is_none());
        assert!(cache.find(&b2.hash()).is_none());
        assert_eq!(cache.head(), cache.linked_root());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn flush_prunes_side_branches_and_reroots() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let b1x = gen_block(Some(&root), "wx", 1);
        let b2 = gen_block(Some(&b1), "w2", 2);

        let i1 = cache.add(b1.clone()).expect("add b1");
        cache.add(b1x.clone()).expect("add b1x");
        let i2 = cache.add(b2.clone()).expect("add b2");

        let flushed = cache.flush(i1).expect("flush b1");
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].hash(), b1.hash());

        assert_eq!(cache.linked_root(), i1);
        assert!(cache.node(i1).parent.is_none());
        assert!(cache.find(&root.hash()).is_none());
        assert!(cache.find(&b1x.hash()).is_none());
        assert_eq!(cache.head(), i2);
    }

    #[test]
    fn flush_drops_unrelated_singles() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let i1 = cache.add(b1).expect("add b1");

        // A single whose ancestry never connects to the root.
        let stray_parent = gen_block(None, "s1", 5);
        let stray = gen_block(Some(&stray_parent), "s2", 6);
        let istray = cache.add(stray.clone()).expect("add stray");
        assert_eq!(cache.node(istray).node_type, NodeType::Single);

        cache.flush(i1).expect("flush");
        assert!(cache.find(&stray.hash()).is_none());
    }

    #[test]
    fn flush_returns_full_path_for_multi_step_advancement() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let b2 = gen_block(Some(&b1), "w2", 2);
        cache.add(b1.clone()).expect("add b1");
        let i2 = cache.add(b2.clone()).expect("add b2");

        let flushed = cache.flush(i2).expect("flush b2");
        let hashes: Vec<BlockHash> = flushed.iter().map(|b| b.hash()).collect();
        assert_eq!(hashes, vec![b1.hash(), b2.hash()]);
    }

    #[test]
    fn get_block_by_number_walks_head_chain() {
        let (mut cache, root) = new_cache();
        let b1 = gen_block(Some(&root), "w1", 1);
        let b2 = gen_block(Some(&b1), "w2", 2);
        cache.add(b1.clone()).expect("add b1");
        cache.add(b2.clone()).expect("add b2");

        assert_eq!(
            cache.get_block_by_number(1).map(|b| b.hash()),
            Some(b1.hash())
        );
        assert_eq!(
            cache.get_block_by_number(2).map(|b| b.hash()),
            Some(b2.hash())
        );
        assert!(cache.get_block_by_number(5).is_none());
    }
}
