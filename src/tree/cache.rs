// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The tree's bounded node cache (spec.md §4.2, "Node I/O and cache"): an
//! LRU keyed by block offset, holding shared, reference-counted node
//! materializations.

use super::node::Node;
use crate::cache::OffsetCache;
use quick_cache::Weighter;
use std::sync::Arc;

/// Every node weighs the same: one block's worth of bytes, regardless of
/// how many keys it currently holds. This keeps the cache's byte budget
/// predictable without re-measuring each node on every insert.
#[derive(Clone, Copy)]
pub struct NodeWeighter {
    block_bytes: u64,
}

impl NodeWeighter {
    /// A weighter charging every entry `block_bytes`.
    #[must_use]
    pub fn new(block_bytes: u64) -> Self {
        Self { block_bytes }
    }
}

impl Weighter<u64, Arc<Node>> for NodeWeighter {
    fn weight(&self, _key: &u64, _value: &Arc<Node>) -> u64 {
        self.block_bytes.max(1)
    }
}

/// A bounded cache from block offset to a shared, cheaply-cloned node.
pub struct NodeCache {
    inner: OffsetCache<Arc<Node>, NodeWeighter>,
}

impl NodeCache {
    /// A cache bounded at `capacity_bytes`, where every node costs
    /// `block_bytes`.
    #[must_use]
    pub fn new(capacity_bytes: u64, block_bytes: u64) -> Self {
        Self {
            inner: OffsetCache::with_capacity_bytes(capacity_bytes, NodeWeighter::new(block_bytes)),
        }
    }

    /// Returns the cached node at `offset`, if present.
    #[must_use]
    pub fn get(&self, offset: u64) -> Option<Arc<Node>> {
        self.inner.get(offset)
    }

    /// Caches `node` under `offset`, evicting older entries as needed.
    pub fn insert(&self, offset: u64, node: Arc<Node>) {
        self.inner.insert(offset, node);
    }

    /// Drops `offset` so the next access re-reads from the block store.
    /// Invoked by the WAL refresh hook (spec.md §4.2).
    pub fn invalidate(&self, offset: u64) {
        self.inner.invalidate(offset);
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::Leaf;
    use test_log::test;

    #[test]
    fn insert_get_invalidate() {
        let cache = NodeCache::new(1_000_000, 4096);
        let node = Arc::new(Node::Leaf(Leaf::empty()));

        cache.insert(10, node.clone());
        assert!(cache.get(10).is_some());

        cache.invalidate(10);
        assert!(cache.get(10).is_none());
    }
}
