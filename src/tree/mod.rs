// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The disk-resident B+ tree index (spec.md §3.2, §4.2): an ordered map
//! from positive `i64` keys to themselves (the tree is purely navigational;
//! callers that need a payload store it elsewhere, keyed by the same
//! 64-bit value), built on top of any [`crate::store::BlockStore`].

pub mod cache;
pub mod node;

pub use cache::NodeCache;
pub use node::{internal_keys_max, leaf_keys_max, Internal, Keyref, Leaf, Node, INTERNAL_SENTINEL, NONE};

use crate::config::{Comparator, TreeConfig};
use crate::file::MAGIC_BYTES;
use crate::store::{AnyBlockStore, BlockStore, BLOCK_HEADER_BYTES};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::sync::Arc;

const MAGIC_OFFSET: u64 = 0;
const COUNT_OFFSET: u64 = 4;
const ROOT_OFFSET: u64 = 12;
const ROOT_TAG_OFFSET: u64 = 20;
const ROOT_DUP_OFFSET: u64 = 24;
const ROOT_TAG: &[u8; 4] = b"ROOT";

/// A handle an external write-ahead-log layer uses to tell the tree that a
/// block's on-disk contents changed behind the store's back (spec.md §4.2,
/// "WAL refresh hook"). Cloning shares the same underlying node cache.
#[derive(Clone)]
pub struct RefreshHandle {
    cache: Arc<NodeCache>,
}

impl RefreshHandle {
    /// Evicts `block_offset` from the node cache, if present, so the next
    /// access re-reads it from the block store.
    pub fn refresh(&self, block_offset: i64) {
        if block_offset >= 0 {
            #[allow(clippy::cast_sign_loss)]
            self.cache.invalidate(block_offset as u64);
        }
    }
}

/// Ascending or descending range-scan order for [`Tree::find`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanOrder {
    /// Scan from the leftmost leaf forward via `right_sibling` links.
    Asc,
    /// Scan from the rightmost leaf backward via `left_sibling` links.
    Desc,
}

struct DeleteResult {
    removed: bool,
    underflow: bool,
    /// The leaf offset whose minimum key changed when the leaf we just
    /// mutated still has keys; only meaningful while bubbling up through
    /// the leftmost-child spine (spec.md §4.2, "separator-refresh walk").
    new_min_leaf: Option<i64>,
}

/// A disk-resident B+ tree index over positive `i64` keys.
pub struct Tree<S: BlockStore> {
    store: S,
    cache: Arc<NodeCache>,
    block_data_bytes: i16,
    comparator: Comparator,
    root: i64,
    count: i64,
}

/// Opens a tree, selecting its block store backend from `config`.
pub fn open(config: TreeConfig) -> Result<Tree<AnyBlockStore>> {
    let store = crate::store::open(config.store.clone())?;
    Tree::new(store, config)
}

impl<S: BlockStore> Tree<S> {
    /// Builds a tree on top of an already-open block store.
    pub fn new(store: S, config: TreeConfig) -> Result<Self> {
        let block_data_bytes = store.block_data_bytes();
        let block_bytes = BLOCK_HEADER_BYTES as u64 + block_data_bytes as u64;
        let cache = Arc::new(NodeCache::new(config.node_cache_bytes, block_bytes));

        let magic = store.head(MAGIC_OFFSET, 4)?;
        let (root, count) = if &*magic == &MAGIC_BYTES[..] {
            let root_bytes = store.head(ROOT_OFFSET, 8)?;
            let count_bytes = store.head(COUNT_OFFSET, 8)?;
            let root = i64::from_le_bytes(
                root_bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Corrupt("root slot truncated"))?,
            );
            let count = i64::from_le_bytes(
                count_bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Corrupt("count slot truncated"))?,
            );
            (root, count)
        } else {
            (NONE, 0)
        };

        let mut tree = Self {
            store,
            cache: cache.clone(),
            block_data_bytes,
            comparator: config.comparator.clone(),
            root,
            count,
        };

        if &*magic != &MAGIC_BYTES[..] {
            tree.persist_root()?;
        }

        if let Some(hook) = config.wal_refresh_hook {
            hook(RefreshHandle { cache });
        }

        Ok(tree)
    }

    /// Number of keys currently in the tree.
    #[must_use]
    pub fn count(&self) -> u64 {
        u64::try_from(self.count).unwrap_or(0)
    }

    /// Total size in bytes of the underlying block store file.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.store.bytes()
    }

    /// Flushes the root slot and closes the underlying block store.
    pub fn close(mut self) -> Result<()> {
        self.persist_root()?;
        self.store.close()
    }

    fn persist_root(&mut self) -> Result<()> {
        self.store.write_head(MAGIC_OFFSET, &MAGIC_BYTES)?;
        self.store.write_head(COUNT_OFFSET, &self.count.to_le_bytes())?;
        self.store.write_head(ROOT_OFFSET, &self.root.to_le_bytes())?;
        self.store.write_head(ROOT_TAG_OFFSET, ROOT_TAG)?;
        self.store.write_head(ROOT_DUP_OFFSET, &self.root.to_le_bytes())?;
        Ok(())
    }

    fn load_node(&self, offset: i64) -> Result<Arc<Node>> {
        if offset < 0 {
            return Err(Error::Corrupt("node offset must be non-negative"));
        }
        #[allow(clippy::cast_sign_loss)]
        let key = offset as u64;

        if let Some(node) = self.cache.get(key) {
            return Ok(node);
        }

        let bytes = self.store.read(offset)?;
        let node = Node::decode(&bytes, self.block_data_bytes)?;
        let arc = Arc::new(node);
        self.cache.insert(key, arc.clone());
        Ok(arc)
    }

    fn write_leaf(&mut self, offset: i64, leaf: &Leaf) -> Result<()> {
        let bytes = leaf.encode(self.block_data_bytes)?;
        self.store.write_at(offset, &bytes)?;
        #[allow(clippy::cast_sign_loss)]
        self.cache.insert(offset as u64, Arc::new(Node::Leaf(leaf.clone())));
        Ok(())
    }

    fn write_internal(&mut self, offset: i64, internal: &Internal) -> Result<()> {
        let bytes = internal.encode(self.block_data_bytes)?;
        self.store.write_at(offset, &bytes)?;
        #[allow(clippy::cast_sign_loss)]
        self.cache.insert(offset as u64, Arc::new(Node::Internal(internal.clone())));
        Ok(())
    }

    fn dereference_min(&self, leaf_offset: i64) -> Result<i64> {
        match &*self.load_node(leaf_offset)? {
            Node::Leaf(leaf) => leaf.min_key().ok_or(Error::Corrupt("separator leaf has no minimum key")),
            Node::Internal(_) => Err(Error::Corrupt("separator offset does not reference a leaf")),
        }
    }

    /// Finds which child of `internal` to descend into for `key`, using the
    /// tree's configured comparator over dereferenced separator minimums.
    fn child_slot_for_key(&self, internal: &Internal, key: i64) -> Result<usize> {
        for (i, kr) in internal.keyrefs.iter().enumerate() {
            let sep = self.dereference_min(kr.separator_leaf_offset)?;
            if (self.comparator)(key, sep) == Ordering::Less {
                return Ok(i);
            }
        }
        Ok(internal.keyrefs.len())
    }

    fn child_slot_for(&self, internal: &Internal, mut cmp: impl FnMut(i64) -> Ordering) -> Result<usize> {
        for (i, kr) in internal.keyrefs.iter().enumerate() {
            let sep = self.dereference_min(kr.separator_leaf_offset)?;
            if cmp(sep) == Ordering::Less {
                return Ok(i);
            }
        }
        Ok(internal.keyrefs.len())
    }

    fn child_offset(internal: &Internal, idx: usize) -> i64 {
        if idx == 0 {
            internal.leftmost_child
        } else {
            internal.keyrefs[idx - 1].right_child
        }
    }

    fn check_key(key: i64) -> Result<()> {
        if key <= 0 {
            return Err(Error::BadArgument("keys must be positive (0 and -1 are reserved)"));
        }
        Ok(())
    }

    /// Looks up `key` using the tree's own comparator.
    pub fn get(&self, key: i64) -> Result<Option<i64>> {
        Self::check_key(key)?;
        if self.root == NONE {
            return Ok(None);
        }

        let mut offset = self.root;
        loop {
            let node = self.load_node(offset)?;
            match &*node {
                Node::Leaf(leaf) => {
                    return Ok(leaf
                        .keys
                        .iter()
                        .find(|&&k| (self.comparator)(k, key) == Ordering::Equal)
                        .copied());
                }
                Node::Internal(internal) => {
                    let idx = self.child_slot_for_key(internal, key)?;
                    offset = Self::child_offset(internal, idx);
                }
            }
        }
    }

    /// Looks up a key by a caller-supplied comparator instead of the tree's
    /// configured one, for hash/equality lookups over foreign-key
    /// representations (spec.md §4.2).
    pub fn compare_get(&self, mut cmp: impl FnMut(i64) -> Ordering) -> Result<Option<i64>> {
        if self.root == NONE {
            return Ok(None);
        }

        let mut offset = self.root;
        loop {
            let node = self.load_node(offset)?;
            match &*node {
                Node::Leaf(leaf) => {
                    return Ok(leaf.keys.iter().find(|&&k| cmp(k) == Ordering::Equal).copied());
                }
                Node::Internal(internal) => {
                    let idx = self.child_slot_for(internal, &mut cmp)?;
                    offset = Self::child_offset(internal, idx);
                }
            }
        }
    }

    fn leftmost_leaf_offset(&self, offset: i64) -> Result<i64> {
        match &*self.load_node(offset)? {
            Node::Leaf(_) => Ok(offset),
            Node::Internal(internal) => self.leftmost_leaf_offset(internal.leftmost_child),
        }
    }

    fn rightmost_leaf_offset(&self, offset: i64) -> Result<i64> {
        match &*self.load_node(offset)? {
            Node::Leaf(_) => Ok(offset),
            Node::Internal(internal) => {
                let child = internal.keyrefs.last().map_or(internal.leftmost_child, |kr| kr.right_child);
                self.rightmost_leaf_offset(child)
            }
        }
    }

    /// Scans keys in `order` via the leaf sibling chain, yielding keys for
    /// which `in_range` returns `Equal` and stopping at the first `Less`
    /// (spec.md §4.2's one-sided comparator: `<0` after range, `=0` in
    /// range, `>0` before range).
    pub fn find(&self, order: ScanOrder, mut in_range: impl FnMut(i64) -> Ordering) -> Result<Vec<i64>> {
        if self.root == NONE {
            return Ok(Vec::new());
        }

        let mut leaf_offset = match order {
            ScanOrder::Asc => self.leftmost_leaf_offset(self.root)?,
            ScanOrder::Desc => self.rightmost_leaf_offset(self.root)?,
        };

        let mut out = Vec::new();

        'outer: while leaf_offset != NONE {
            let node = self.load_node(leaf_offset)?;
            let Node::Leaf(leaf) = &*node else {
                return Err(Error::Corrupt("sibling chain reached a non-leaf node"));
            };

            let keys: Vec<i64> = match order {
                ScanOrder::Asc => leaf.keys.clone(),
                ScanOrder::Desc => leaf.keys.iter().rev().copied().collect(),
            };

            for key in keys {
                match in_range(key) {
                    Ordering::Less => break 'outer,
                    Ordering::Equal => out.push(key),
                    Ordering::Greater => {}
                }
            }

            leaf_offset = match order {
                ScanOrder::Asc => leaf.right_sibling,
                ScanOrder::Desc => leaf.left_sibling,
            };
        }

        Ok(out)
    }

    /// Inserts `key`. A no-op if the key is already present.
    pub fn put(&mut self, key: i64) -> Result<()> {
        Self::check_key(key)?;

        if self.root == NONE {
            let leaf = Leaf {
                left_sibling: NONE,
                right_sibling: NONE,
                keys: vec![key],
            };
            let bytes = leaf.encode(self.block_data_bytes)?;
            let offset = self.store.write(&bytes)?;
            #[allow(clippy::cast_sign_loss)]
            self.cache.insert(offset as u64, Arc::new(Node::Leaf(leaf)));
            self.root = offset;
            self.count = 1;
            self.persist_root()?;
            return Ok(());
        }

        let outcome = self.insert_into(self.root, key)?;
        if !outcome.inserted {
            return Ok(());
        }

        if let Some(split) = outcome.split {
            let new_root = Internal {
                leftmost_child: self.root,
                keyrefs: vec![Keyref {
                    separator_leaf_offset: split.separator_leaf_offset,
                    right_child: split.right_child_offset,
                }],
            };
            let bytes = new_root.encode(self.block_data_bytes)?;
            let offset = self.store.write(&bytes)?;
            #[allow(clippy::cast_sign_loss)]
            self.cache.insert(offset as u64, Arc::new(Node::Internal(new_root)));
            self.root = offset;
        }

        self.count += 1;
        self.persist_root()?;
        Ok(())
    }

    fn insert_into(&mut self, offset: i64, key: i64) -> Result<InsertOutcome> {
        let node = self.load_node(offset)?;
        match &*node {
            Node::Leaf(leaf) => {
                let mut leaf = leaf.clone();
                match leaf.keys.binary_search(&key) {
                    Ok(_) => Ok(InsertOutcome { inserted: false, split: None }),
                    Err(idx) => {
                        leaf.keys.insert(idx, key);
                        let max_keys = leaf_keys_max(self.block_data_bytes);
                        if leaf.keys.len() <= max_keys {
                            self.write_leaf(offset, &leaf)?;
                            Ok(InsertOutcome { inserted: true, split: None })
                        } else {
                            let split = self.redistribute_or_split_leaf(offset, leaf)?;
                            Ok(InsertOutcome { inserted: true, split })
                        }
                    }
                }
            }
            Node::Internal(internal) => {
                let mut internal = internal.clone();
                let idx = self.child_slot_for_key(&internal, key)?;
                let child_offset = Self::child_offset(&internal, idx);

                let result = self.insert_into(child_offset, key)?;
                if !result.inserted {
                    return Ok(result);
                }

                let Some(split) = result.split else {
                    return Ok(InsertOutcome { inserted: true, split: None });
                };

                internal.keyrefs.insert(
                    idx,
                    Keyref {
                        separator_leaf_offset: split.separator_leaf_offset,
                        right_child: split.right_child_offset,
                    },
                );

                let max_keys = internal_keys_max(self.block_data_bytes);
                if internal.keyrefs.len() <= max_keys {
                    self.write_internal(offset, &internal)?;
                    Ok(InsertOutcome { inserted: true, split: None })
                } else {
                    let split = self.split_internal(offset, internal)?;
                    Ok(InsertOutcome { inserted: true, split: Some(split) })
                }
            }
        }
    }

    /// Resolves a leaf overflow (spec.md §4.2, "Insertion algorithm"): first
    /// tries redistributing the single overflow key into a sibling with
    /// spare capacity (the right sibling takes the overflow key; failing
    /// that, the left sibling takes this leaf's current minimum, freeing a
    /// slot for the overflow key to stay), and only allocates a brand new
    /// sibling — holding just the overflow key — if neither neighbor has
    /// room. Redistribution never needs to refresh any parent separator:
    /// those reference a leaf offset and are dereferenced dynamically via
    /// `dereference_min`, so a leaf's minimum changing is invisible to its
    /// ancestors.
    fn redistribute_or_split_leaf(&mut self, offset: i64, mut leaf: Leaf) -> Result<Option<Split>> {
        let max_keys = leaf_keys_max(self.block_data_bytes);
        debug_assert_eq!(leaf.keys.len(), max_keys + 1);

        if leaf.right_sibling != NONE {
            let mut right = match &*self.load_node(leaf.right_sibling)? {
                Node::Leaf(right) => right.clone(),
                Node::Internal(_) => return Err(Error::Corrupt("leaf sibling link reached an internal node")),
            };
            if right.keys.len() < max_keys {
                let overflow_key = leaf.keys.pop().expect("leaf overflowed by exactly one key");
                let pos = right.keys.binary_search(&overflow_key).unwrap_or_else(|p| p);
                right.keys.insert(pos, overflow_key);
                let right_offset = leaf.right_sibling;
                self.write_leaf(offset, &leaf)?;
                self.write_leaf(right_offset, &right)?;
                return Ok(None);
            }
        }

        if leaf.left_sibling != NONE {
            let mut left = match &*self.load_node(leaf.left_sibling)? {
                Node::Leaf(left) => left.clone(),
                Node::Internal(_) => return Err(Error::Corrupt("leaf sibling link reached an internal node")),
            };
            if left.keys.len() < max_keys {
                let current_min = leaf.keys.remove(0);
                let pos = left.keys.binary_search(&current_min).unwrap_or_else(|p| p);
                left.keys.insert(pos, current_min);
                let left_offset = leaf.left_sibling;
                self.write_leaf(left_offset, &left)?;
                self.write_leaf(offset, &leaf)?;
                return Ok(None);
            }
        }

        let overflow_key = leaf.keys.pop().expect("leaf overflowed by exactly one key");
        let old_right_sibling = leaf.right_sibling;

        let right_leaf = Leaf {
            left_sibling: offset,
            right_sibling: old_right_sibling,
            keys: vec![overflow_key],
        };
        let right_bytes = right_leaf.encode(self.block_data_bytes)?;
        let right_offset = self.store.write(&right_bytes)?;
        #[allow(clippy::cast_sign_loss)]
        self.cache.insert(right_offset as u64, Arc::new(Node::Leaf(right_leaf)));

        leaf.right_sibling = right_offset;
        self.write_leaf(offset, &leaf)?;

        if old_right_sibling != NONE {
            if let Node::Leaf(rightmost) = &*self.load_node(old_right_sibling)? {
                let mut rightmost = rightmost.clone();
                rightmost.left_sibling = right_offset;
                self.write_leaf(old_right_sibling, &rightmost)?;
            }
        }

        Ok(Some(Split {
            separator_leaf_offset: right_offset,
            right_child_offset: right_offset,
        }))
    }

    fn split_internal(&mut self, offset: i64, internal: Internal) -> Result<Split> {
        let mid = internal.keyrefs.len() / 2;
        let promoted = internal.keyrefs[mid];

        let right_internal = Internal {
            leftmost_child: promoted.right_child,
            keyrefs: internal.keyrefs[mid + 1..].to_vec(),
        };
        let right_bytes = right_internal.encode(self.block_data_bytes)?;
        let right_offset = self.store.write(&right_bytes)?;
        #[allow(clippy::cast_sign_loss)]
        self.cache.insert(right_offset as u64, Arc::new(Node::Internal(right_internal)));

        let left_internal = Internal {
            leftmost_child: internal.leftmost_child,
            keyrefs: internal.keyrefs[..mid].to_vec(),
        };
        self.write_internal(offset, &left_internal)?;

        Ok(Split {
            separator_leaf_offset: promoted.separator_leaf_offset,
            right_child_offset: right_offset,
        })
    }

    /// Deletes `key`. Returns `1` if it was present, `0` otherwise.
    pub fn delete(&mut self, key: i64) -> Result<u32> {
        Self::check_key(key)?;
        if self.root == NONE {
            return Ok(0);
        }

        let result = self.delete_from(self.root, key)?;
        if !result.removed {
            return Ok(0);
        }
        self.count -= 1;

        if result.underflow {
            let root_is_leaf = matches!(&*self.load_node(self.root)?, Node::Leaf(_));
            if root_is_leaf {
                #[allow(clippy::cast_sign_loss)]
                self.cache.invalidate(self.root as u64);
                self.store.delete(self.root)?;
                self.root = NONE;
            } else {
                self.collapse_root_if_needed()?;
            }
        }

        self.persist_root()?;
        Ok(1)
    }

    fn delete_from(&mut self, offset: i64, key: i64) -> Result<DeleteResult> {
        let node = self.load_node(offset)?;
        match &*node {
            Node::Leaf(leaf) => {
                let mut leaf = leaf.clone();
                let Ok(pos) = leaf.keys.binary_search(&key) else {
                    return Ok(DeleteResult { removed: false, underflow: false, new_min_leaf: None });
                };
                leaf.keys.remove(pos);
                let underflow = leaf.keys.is_empty();
                let new_min_leaf = leaf.min_key().map(|_| offset);
                self.write_leaf(offset, &leaf)?;
                Ok(DeleteResult { removed: true, underflow, new_min_leaf })
            }
            Node::Internal(internal) => {
                let mut internal = internal.clone();
                let idx = self.child_slot_for_key(&internal, key)?;
                let child_offset = Self::child_offset(&internal, idx);

                let mut result = self.delete_from(child_offset, key)?;
                if !result.removed {
                    return Ok(result);
                }

                let mut dirty = false;

                if idx > 0 {
                    if let Some(leaf_offset) = result.new_min_leaf {
                        internal.keyrefs[idx - 1].separator_leaf_offset = leaf_offset;
                        dirty = true;
                    }
                    result.new_min_leaf = None;
                }

                let mut underflow_here = false;
                if result.underflow {
                    underflow_here = self.rebalance_child(&mut internal, idx)?;
                    dirty = true;
                }

                if dirty {
                    self.write_internal(offset, &internal)?;
                }

                Ok(DeleteResult {
                    removed: true,
                    underflow: underflow_here,
                    new_min_leaf: result.new_min_leaf,
                })
            }
        }
    }

    /// Unlinks and deletes the now-empty child at position `idx` (leaf or
    /// internal), dropping the separator that pointed to it, after first
    /// trying to borrow a single key from an adjacent sibling under the
    /// same parent when the empty child is a leaf (spec.md §4.2, "Deletion
    /// algorithm"): a right sibling with more than half capacity lends its
    /// minimum key; failing that, a left sibling with more than half
    /// capacity lends its maximum. Only once neither neighbor can lend does
    /// the child get unlinked and deleted outright. Returns whether
    /// `internal` itself is now empty.
    fn rebalance_child(&mut self, internal: &mut Internal, idx: usize) -> Result<bool> {
        let empty_offset = Self::child_offset(internal, idx);
        let empty_node = self.load_node(empty_offset)?;

        if let Node::Leaf(empty_leaf) = &*empty_node {
            let borrow_threshold = leaf_keys_max(self.block_data_bytes) / 2;

            if idx < internal.keyrefs.len() {
                let right_offset = Self::child_offset(internal, idx + 1);
                if let Node::Leaf(right) = &*self.load_node(right_offset)? {
                    if right.keys.len() > borrow_threshold {
                        let mut right = right.clone();
                        let borrowed = right.keys.remove(0);
                        self.write_leaf(right_offset, &right)?;

                        let mut empty_leaf = empty_leaf.clone();
                        empty_leaf.keys.push(borrowed);
                        self.write_leaf(empty_offset, &empty_leaf)?;
                        return Ok(false);
                    }
                }
            }

            if idx > 0 {
                let left_offset = Self::child_offset(internal, idx - 1);
                if let Node::Leaf(left) = &*self.load_node(left_offset)? {
                    if left.keys.len() > borrow_threshold {
                        let mut left = left.clone();
                        let borrowed = left.keys.pop().expect("checked length above");
                        self.write_leaf(left_offset, &left)?;

                        let mut empty_leaf = empty_leaf.clone();
                        empty_leaf.keys.push(borrowed);
                        self.write_leaf(empty_offset, &empty_leaf)?;
                        return Ok(false);
                    }
                }
            }
        }

        if let Node::Leaf(leaf) = &*empty_node {
            let (left, right) = (leaf.left_sibling, leaf.right_sibling);
            if left != NONE {
                if let Node::Leaf(l) = &*self.load_node(left)? {
                    let mut l = l.clone();
                    l.right_sibling = right;
                    self.write_leaf(left, &l)?;
                }
            }
            if right != NONE {
                if let Node::Leaf(r) = &*self.load_node(right)? {
                    let mut r = r.clone();
                    r.left_sibling = left;
                    self.write_leaf(right, &r)?;
                }
            }
        }

        self.store.delete(empty_offset)?;
        #[allow(clippy::cast_sign_loss)]
        self.cache.invalidate(empty_offset as u64);

        if idx == 0 {
            if !internal.keyrefs.is_empty() {
                let promoted = internal.keyrefs.remove(0);
                internal.leftmost_child = promoted.right_child;
            }
        } else {
            internal.keyrefs.remove(idx - 1);
        }

        Ok(internal.keyrefs.is_empty())
    }

    /// Collapses the root while it is internal with zero separators,
    /// promoting its sole remaining child, or clears the root entirely if
    /// that child was itself just deleted (spec.md §3.2, "Root collapse").
    fn collapse_root_if_needed(&mut self) -> Result<()> {
        loop {
            if self.root == NONE {
                return Ok(());
            }

            let should_collapse = matches!(&*self.load_node(self.root)?, Node::Internal(i) if i.keyrefs.is_empty());
            if !should_collapse {
                return Ok(());
            }

            let Node::Internal(internal) = &*self.load_node(self.root)? else {
                unreachable!("checked above");
            };
            let child = internal.leftmost_child;
            let old_root = self.root;

            match self.store.read(child) {
                Ok(_) => {
                    #[allow(clippy::cast_sign_loss)]
                    self.cache.invalidate(old_root as u64);
                    self.store.delete(old_root)?;
                    self.root = child;
                }
                Err(Error::NotSet) => {
                    #[allow(clippy::cast_sign_loss)]
                    self.cache.invalidate(old_root as u64);
                    self.store.delete(old_root)?;
                    self.root = NONE;
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }
}

struct InsertOutcome {
    inserted: bool,
    split: Option<Split>,
}

struct Split {
    separator_leaf_offset: i64,
    right_child_offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, TreeConfig};
    use crate::store::{MemorySource, Store};
    use test_log::test;

    fn open_tree(block_data_bytes: i16) -> Result<Tree<Store<MemorySource>>> {
        let config = TreeConfig::new("unused-for-memory-backend")
            .backend(Backend::Memory)
            .block_data_bytes(block_data_bytes)
            .increment_bytes(block_data_bytes as u32 * 64);
        let store: Store<MemorySource> = Store::open(config.store.clone())?;
        Tree::new(store, config)
    }

    #[test]
    fn put_get_idempotent() -> Result<()> {
        let mut tree = open_tree(128)?;
        tree.put(5)?;
        tree.put(5)?;
        assert_eq!(tree.count(), 1);
        assert_eq!(tree.get(5)?, Some(5));
        assert_eq!(tree.get(6)?, None);
        Ok(())
    }

    #[test]
    fn s3_splits_and_lookup() -> Result<()> {
        let mut tree = open_tree(4080)?;
        for k in 1..=1000i64 {
            tree.put(k)?;
        }

        assert_eq!(tree.count(), 1000);
        for k in 1..=1000i64 {
            assert_eq!(tree.get(k)?, Some(k));
        }
        assert_eq!(tree.get(1001)?, None);

        // 1000 keys vastly exceed one leaf's capacity at this block size, so
        // the root must have split into a real multi-level tree.
        let mut depth = 1;
        let mut offset = tree.root;
        loop {
            match &*tree.load_node(offset)? {
                Node::Leaf(_) => break,
                Node::Internal(internal) => {
                    depth += 1;
                    offset = internal.leftmost_child;
                }
            }
        }
        assert!(depth >= 2, "expected at least two levels, got {depth}");
        Ok(())
    }

    #[test]
    fn s4_range_scan_both_directions() -> Result<()> {
        let mut tree = open_tree(4080)?;
        for k in 1..=1000i64 {
            tree.put(k)?;
        }

        let asc = tree.find(ScanOrder::Asc, |k| {
            if k < 250 {
                Ordering::Greater
            } else if k > 260 {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })?;
        assert_eq!(asc, (250..=260).collect::<Vec<_>>());

        let desc = tree.find(ScanOrder::Desc, |k| {
            if k > 260 {
                Ordering::Greater
            } else if k < 250 {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })?;
        assert_eq!(desc, (250..=260).rev().collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn s5_delete_rebalance() -> Result<()> {
        let mut tree = open_tree(4080)?;
        for k in 1..=1000i64 {
            tree.put(k)?;
        }
        for k in 1..=500i64 {
            assert_eq!(tree.delete(k)?, 1);
            for check in 501..=1000i64 {
                assert_eq!(tree.get(check)?, Some(check));
            }
        }

        let remaining = tree.find(ScanOrder::Asc, |k| {
            if k < 501 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })?;
        assert_eq!(remaining, (501..=1000).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn delete_idempotent_and_absent() -> Result<()> {
        let mut tree = open_tree(128)?;
        tree.put(3)?;
        assert_eq!(tree.delete(3)?, 1);
        assert_eq!(tree.delete(3)?, 0);
        assert_eq!(tree.delete(99)?, 0);
        assert_eq!(tree.count(), 0);
        Ok(())
    }

    #[test]
    fn rejects_non_positive_keys() -> Result<()> {
        let mut tree = open_tree(128)?;
        assert!(tree.put(0).is_err());
        assert!(tree.put(-1).is_err());
        Ok(())
    }

    #[test]
    fn s6_refresh_hook_drops_cache_entry() -> Result<()> {
        let config = TreeConfig::new("unused-for-memory-backend")
            .backend(Backend::Memory)
            .block_data_bytes(4080)
            .increment_bytes(4080 * 64);
        let store: Store<MemorySource> = Store::open(config.store.clone())?;

        let handle_slot = std::sync::Arc::new(std::sync::Mutex::new(None));
        let handle_slot_clone = handle_slot.clone();
        let config = config.wal_refresh_hook(move |handle| {
            *handle_slot_clone.lock().expect("lock") = Some(handle);
        });

        let mut tree = Tree::new(store, config)?;
        for k in 1..=1000i64 {
            tree.put(k)?;
        }

        let root = tree.root;
        assert!(tree.cache.get(root as u64).is_some());

        let handle = handle_slot.lock().expect("lock").clone().expect("hook invoked");
        handle.refresh(root);
        assert!(tree.cache.get(root as u64).is_none());

        // Re-fetching still works after eviction.
        assert_eq!(tree.get(1)?, Some(1));
        Ok(())
    }
}
