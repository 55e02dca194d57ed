// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bounded integer-keyed map, used both as the B+ tree's node cache and as
//! the mmap backend's chunk cache (spec.md §2, dependency order item 2).
//!
//! A thin wrapper around `quick_cache`, following the same pattern as the
//! teacher's `Cache`/`BlockCache`: a `Weighter` translates each cached value
//! into a byte weight, and the cache is opened with a fixed weight budget
//! rather than an item-count budget.

use quick_cache::sync::Cache as QuickCache;
use quick_cache::Weighter;

/// A bounded, LRU-evicted cache from `u64` offset to a cloneable value,
/// weighted in bytes rather than item count.
pub struct OffsetCache<V, W>
where
    V: Clone + Send + Sync + 'static,
    W: Weighter<u64, V> + Clone + Send + Sync + 'static,
{
    data: QuickCache<u64, V, W, rustc_hash::FxBuildHasher>,
    capacity: u64,
}

impl<V, W> OffsetCache<V, W>
where
    V: Clone + Send + Sync + 'static,
    W: Weighter<u64, V> + Clone + Send + Sync + 'static,
{
    /// Creates a new cache with roughly `capacity_bytes` of budget, weighted
    /// by `weighter`.
    #[must_use]
    pub fn with_capacity_bytes(capacity_bytes: u64, weighter: W) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::default_trait_access)]
        let data = QuickCache::with(
            1_000,
            capacity_bytes,
            weighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data,
            capacity: capacity_bytes,
        }
    }

    /// Returns the cached value for `offset`, if present.
    #[must_use]
    pub fn get(&self, offset: u64) -> Option<V> {
        self.data.get(&offset)
    }

    /// Caches `value` under `offset`, evicting older entries as needed.
    pub fn insert(&self, offset: u64, value: V) {
        self.data.insert(offset, value);
    }

    /// Drops `offset` from the cache, if present. Used by the WAL refresh
    /// hook and by any in-place overwrite that must not serve a stale node.
    pub fn invalidate(&self, offset: u64) {
        self.data.remove(&offset);
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Current weighted size of the cache, in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// The byte budget this cache was opened with.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the cache currently holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[derive(Clone)]
    struct ByteLen(Vec<u8>);

    #[derive(Clone)]
    struct LenWeighter;

    impl Weighter<u64, ByteLen> for LenWeighter {
        fn weight(&self, _key: &u64, val: &ByteLen) -> u64 {
            val.0.len() as u64
        }
    }

    #[test]
    fn insert_get_invalidate() {
        let cache = OffsetCache::with_capacity_bytes(1024, LenWeighter);

        cache.insert(10, ByteLen(vec![1, 2, 3]));
        assert_eq!(cache.get(10).unwrap().0, vec![1, 2, 3]);

        cache.invalidate(10);
        assert!(cache.get(10).is_none());
    }

    #[test]
    fn eviction_under_pressure() {
        let cache = OffsetCache::with_capacity_bytes(16, LenWeighter);

        for i in 0..100u64 {
            cache.insert(i, ByteLen(vec![0u8; 8]));
        }

        assert!(cache.size() <= 16 + 8);
    }
}
