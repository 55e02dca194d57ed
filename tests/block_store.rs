// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Integration coverage for the block store over real files (the unit tests
//! in `src/store/mod.rs` exercise the same contract against the in-memory
//! backend; these exercise the on-disk backends end to end).

use flint_core::config::{Backend, OpenMode};
use flint_core::{BlockStore, Result, StoreConfig};
use test_log::test;

fn config(path: &std::path::Path) -> StoreConfig {
    StoreConfig::new(path)
        .backend(Backend::Mmap)
        .block_data_bytes(256)
        .increment_bytes(64 * 1024)
}

#[cfg(feature = "mmap")]
#[test]
fn mmap_roundtrip_across_reopen() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blocks.flint");

    let mut store = flint_core::store::open(config(&path))?;
    let a = store.write(b"hello, world")?;
    let b = store.write(&[0xABu8; 3_000])?;
    store.close()?;

    let mut store = flint_core::store::open(config(&path).mode(OpenMode::ReadWrite))?;
    assert_eq!(&*store.read(a)?, b"hello, world");
    assert_eq!(&*store.read(b)?, &[0xABu8; 3_000][..]);
    assert_eq!(store.count(), 2);

    store.delete(a)?;
    assert!(store.read(a).is_err());
    store.close()?;
    Ok(())
}

#[cfg(all(feature = "direct-io", unix))]
#[test]
fn direct_io_backend_roundtrips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("blocks-dio.flint");
    let config = StoreConfig::new(&path)
        .backend(Backend::DirectIo)
        .block_data_bytes(256)
        .increment_bytes(64 * 1024);

    let mut store = flint_core::store::open(config).expect("open");
    let idx = store.write(&[0x5Au8; 1_000]).expect("write");
    assert_eq!(&*store.read(idx).expect("read"), &[0x5Au8; 1_000][..]);
    store.close().expect("close");
}

#[cfg(feature = "mmap")]
#[test]
fn extra_header_region_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("header.flint");

    let mut store = flint_core::store::open(config(&path))?;
    store.write_head(0, b"B+T1")?;
    store.write_head(12, &42i64.to_le_bytes())?;
    store.close()?;

    let store = flint_core::store::open(config(&path).mode(OpenMode::ReadWrite))?;
    assert_eq!(&*store.head(0, 4)?, b"B+T1");
    assert_eq!(store.head(12, 8)?.to_vec(), 42i64.to_le_bytes().to_vec());
    Ok(())
}
