// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Enumerated configuration for the block store and the B+ tree index.
//!
//! Follows the teacher's builder style (`Config::new(path).with_x(..).open()`):
//! explicit setters over a struct with sane defaults, validation deferred to
//! `open()`.

use crate::tree::RefreshHandle;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A pluggable key comparator, permitting descending orders and foreign-key
/// orderings over the tree's `i64` keys (spec.md §4.2).
pub type Comparator = Arc<dyn Fn(i64, i64) -> Ordering + Send + Sync>;

/// Whether a store/tree handle may mutate the underlying file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// The file must already exist; mutation is rejected.
    ReadOnly,
    /// The file is created if missing; mutation is permitted.
    ReadWrite,
}

/// Which I/O backend a block store uses. All three expose identical
/// semantics (see `spec.md` §4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Memory-mapped, chunk-cached backend. Default for most workloads.
    Mmap,
    /// Direct I/O (`O_DIRECT`/`F_NOCACHE`) backend with an aligned
    /// page write-back cache.
    DirectIo,
    /// Heap-only backend with no durability. Used for tests and ephemeral
    /// indexes.
    Memory,
}

/// Default growth increment: 16 MiB, rounded to block size and OS page size
/// at open time.
pub const DEFAULT_INCREMENT_BYTES: u32 = 16 * 1024 * 1024;

/// Default user block payload size.
pub const DEFAULT_BLOCK_DATA_BYTES: i16 = 4080;

/// Floor below which a requested node cache budget is raised.
pub const NODE_CACHE_FLOOR_BYTES: u64 = 256 * 1024;

/// Default node cache budget.
pub const DEFAULT_NODE_CACHE_BYTES: u64 = 1024 * 1024;

/// Configuration for opening a [`crate::store`] block file.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub(crate) path: PathBuf,
    pub(crate) mode: OpenMode,
    pub(crate) backend: Backend,
    pub(crate) block_data_bytes: i16,
    pub(crate) increment_bytes: u32,
}

impl StoreConfig {
    /// A config for `path` with default mode, backend, and sizing.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: OpenMode::ReadWrite,
            backend: Backend::Mmap,
            block_data_bytes: DEFAULT_BLOCK_DATA_BYTES,
            increment_bytes: DEFAULT_INCREMENT_BYTES,
        }
    }

    /// Sets whether the store may mutate the underlying file.
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the I/O backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the user block payload size.
    #[must_use]
    pub fn block_data_bytes(mut self, bytes: i16) -> Self {
        self.block_data_bytes = bytes;
        self
    }

    /// Sets the file growth increment.
    #[must_use]
    pub fn increment_bytes(mut self, bytes: u32) -> Self {
        self.increment_bytes = bytes;
        self
    }
}

/// Configuration for opening a [`crate::tree`] B+ tree index.
pub struct TreeConfig {
    pub(crate) store: StoreConfig,
    pub(crate) node_cache_bytes: u64,
    pub(crate) comparator: Comparator,
    pub(crate) wal_refresh_hook: Option<Box<dyn FnOnce(RefreshHandle) + Send>>,
}

impl std::fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeConfig")
            .field("store", &self.store)
            .field("node_cache_bytes", &self.node_cache_bytes)
            .field("wal_refresh_hook", &self.wal_refresh_hook.is_some())
            .finish()
    }
}

impl TreeConfig {
    /// A config for `path` with default mode, backend, sizing, and
    /// ascending numeric ordering.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            store: StoreConfig::new(path),
            node_cache_bytes: DEFAULT_NODE_CACHE_BYTES,
            comparator: Arc::new(|a, b| a.cmp(&b)),
            wal_refresh_hook: None,
        }
    }

    /// Sets whether the tree may mutate the underlying file.
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.store = self.store.mode(mode);
        self
    }

    /// Sets the I/O backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.store = self.store.backend(backend);
        self
    }

    /// Sets the user block payload size.
    #[must_use]
    pub fn block_data_bytes(mut self, bytes: i16) -> Self {
        self.store = self.store.block_data_bytes(bytes);
        self
    }

    /// Sets the file growth increment.
    #[must_use]
    pub fn increment_bytes(mut self, bytes: u32) -> Self {
        self.store = self.store.increment_bytes(bytes);
        self
    }

    /// Sets the node cache budget in bytes. Values below
    /// [`NODE_CACHE_FLOOR_BYTES`] are clamped up to the floor.
    #[must_use]
    pub fn node_cache_bytes(mut self, bytes: u64) -> Self {
        self.node_cache_bytes = bytes.max(NODE_CACHE_FLOOR_BYTES);
        self
    }

    /// Sets the key comparator used for navigation during `put`/`get`/
    /// `delete`. Defaults to ascending numeric order; permits descending
    /// orders and foreign-key orderings.
    #[must_use]
    pub fn comparator(mut self, cmp: impl Fn(i64, i64) -> Ordering + Send + Sync + 'static) -> Self {
        self.comparator = Arc::new(cmp);
        self
    }

    /// Registers a WAL attach callback. At `open()`, the tree invokes this
    /// once with a [`RefreshHandle`] the WAL layer can later call with a
    /// block offset whenever it invalidates that block behind the store's
    /// back; the tree drops the offset from its node cache on the next
    /// access.
    #[must_use]
    pub fn wal_refresh_hook(mut self, on_attach: impl FnOnce(RefreshHandle) + Send + 'static) -> Self {
        self.wal_refresh_hook = Some(Box::new(on_attach));
        self
    }
}
