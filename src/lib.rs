// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, file-backed, block-paged storage engine plus a disk-resident
//! B+ tree index built on top of it.
//!
//! ##### About
//!
//! The crate is split into two layers:
//!
//! - [`store`]: a self-describing, free-listed, block-oriented file (the
//!   "block store"). Records are chains of fixed-size blocks; a free list
//!   threads reclaimed blocks back into allocation. Three interchangeable
//!   I/O backends - memory-mapped, direct I/O, and an in-memory backend for
//!   tests - sit behind one [`store::PageSource`] capability interface, so
//!   all allocation/free-list/overflow-chain logic lives exactly once in
//!   [`store::Store`].
//! - [`tree`]: a disk-resident B+ tree over 64-bit keys, generic over any
//!   [`store::BlockStore`]. Leaf nodes form a sibling-linked chain for range
//!   scans; internal nodes hold separators as leaf-offset references rather
//!   than copied key values. A bounded node cache sits in front of block
//!   reads, with a refresh hook an external write-ahead log can use to
//!   invalidate cache entries it bypassed.
//!
//! Both layers are generic over their capability traits rather than using
//! dynamic dispatch - the tree is never built against `Box<dyn BlockStore>`,
//! only a concrete backend chosen once at `open()`.
//!
//! # Example usage
//!
//! ```
//! use flint_core::config::TreeConfig;
//! use flint_core::tree;
//! #
//! # let dir = tempfile::tempdir()?;
//! # let path = dir.path().join("index.flint");
//!
//! let config = TreeConfig::new(&path);
//! let mut index = tree::open(config)?;
//!
//! index.put(10)?;
//! index.put(20)?;
//! index.put(30)?;
//!
//! assert_eq!(index.get(20)?, Some(20));
//! assert_eq!(index.get(25)?, None);
//!
//! index.delete(20)?;
//! assert_eq!(index.get(20)?, None);
//! assert_eq!(index.count(), 2);
//!
//! index.close()?;
//! #
//! # Ok::<(), flint_core::Error>(())
//! ```

#![deny(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod buf;
pub mod cache;
pub mod coding;
pub mod config;
mod error;
pub mod file;
pub mod fs;
pub mod store;
pub mod tree;

pub use buf::{ByteBuf, PageView};
pub use config::{Backend, OpenMode, StoreConfig, TreeConfig};
pub use error::{Error, Result};
pub use store::{AnyBlockStore, BlockStore, Store};
pub use tree::{RefreshHandle, ScanOrder, Tree};
