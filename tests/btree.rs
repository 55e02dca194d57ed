// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Integration coverage for the B+ tree over a real file (the unit tests in
//! `src/tree/mod.rs` exercise the same contract against the in-memory
//! backend; these go through `tree::open` end to end, including the root
//! slot surviving a real close/reopen). Uses the default mmap backend.
#![cfg(feature = "mmap")]

use flint_core::config::TreeConfig;
use flint_core::{tree, Result, ScanOrder};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

fn config(path: &std::path::Path) -> TreeConfig {
    TreeConfig::new(path).block_data_bytes(256).increment_bytes(64 * 1024)
}

#[test]
fn root_slot_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("index.flint");

    let mut index = tree::open(config(&path))?;
    for k in 1..=500i64 {
        index.put(k)?;
    }
    assert_eq!(index.count(), 500);
    index.close()?;

    let mut index = tree::open(config(&path))?;
    assert_eq!(index.count(), 500);
    for k in 1..=500i64 {
        assert_eq!(index.get(k)?, Some(k));
    }

    index.delete(250)?;
    assert_eq!(index.get(250)?, None);
    assert_eq!(index.count(), 499);
    index.close()?;

    let index = tree::open(config(&path))?;
    assert_eq!(index.count(), 499);
    assert_eq!(index.get(250)?, None);
    assert_eq!(index.get(249)?, Some(249));
    Ok(())
}

#[test]
fn descending_comparator_reverses_navigation_order() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("index.flint");

    let mut index = tree::open(config(&path).comparator(|a, b| b.cmp(&a)))?;
    for k in [30, 10, 50, 20, 40] {
        index.put(k)?;
    }

    for k in [10, 20, 30, 40, 50] {
        assert_eq!(index.get(k)?, Some(k));
    }
    assert_eq!(index.get(25)?, None);

    let all = index.find(ScanOrder::Asc, |_| Ordering::Equal)?;
    assert_eq!(all, vec![50, 40, 30, 20, 10]);
    index.close()?;
    Ok(())
}

#[test]
fn wal_refresh_hook_attaches_on_open() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("index.flint");

    let attached = Arc::new(AtomicBool::new(false));
    let attached_clone = attached.clone();

    let mut index = tree::open(
        config(&path).wal_refresh_hook(move |handle| {
            attached_clone.store(true, AtomicOrdering::SeqCst);
            handle.refresh(-1);
        }),
    )?;
    assert!(attached.load(AtomicOrdering::SeqCst));

    index.put(1)?;
    assert_eq!(index.get(1)?, Some(1));
    index.close()?;
    Ok(())
}
