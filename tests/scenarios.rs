// Copyright (c) 2026-present, the flint-core authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A randomized model test: drives `Tree` through a sequence of put/delete
//! operations chosen by an RNG and checks every observable result against a
//! `BTreeSet` reference, the way the teacher's own property tests check the
//! tree against a naive in-memory model.

use flint_core::config::{Backend, TreeConfig};
use flint_core::{Result, ScanOrder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BTreeSet;

fn model_config() -> TreeConfig {
    TreeConfig::new("unused-for-memory-backend")
        .backend(Backend::Memory)
        .block_data_bytes(256)
        .increment_bytes(256 * 64)
}

#[test]
fn random_put_delete_matches_btreeset_model() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0xF11_7000);
    let mut tree = flint_core::tree::open(model_config())?;
    let mut model: BTreeSet<i64> = BTreeSet::new();

    for _ in 0..5_000 {
        let key = rng.random_range(1..=2_000i64);
        if rng.random_bool(0.65) {
            tree.put(key)?;
            model.insert(key);
        } else {
            let removed = tree.delete(key)?;
            let was_present = model.remove(&key);
            assert_eq!(removed == 1, was_present, "delete({key}) disagreed with model");
        }

        assert_eq!(tree.count(), model.len() as u64);
    }

    for key in 1..=2_000i64 {
        assert_eq!(tree.get(key)?, model.get(&key).copied(), "get({key}) disagreed with model");
    }

    let scanned = tree.find(ScanOrder::Asc, |_| Ordering::Equal)?;
    let expected: Vec<i64> = model.iter().copied().collect();
    assert_eq!(scanned, expected);

    let scanned_desc = tree.find(ScanOrder::Desc, |_| Ordering::Equal)?;
    let expected_desc: Vec<i64> = model.iter().rev().copied().collect();
    assert_eq!(scanned_desc, expected_desc);

    Ok(())
}

#[test]
fn random_bounded_range_scan_matches_model() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0xB0DE_D000);
    let mut tree = flint_core::tree::open(model_config())?;
    let mut model: BTreeSet<i64> = BTreeSet::new();

    for _ in 0..1_500 {
        let key = rng.random_range(1..=800i64);
        tree.put(key)?;
        model.insert(key);
    }

    for _ in 0..50 {
        let lo = rng.random_range(1..=800i64);
        let hi = rng.random_range(lo..=800i64);

        let got = tree.find(ScanOrder::Asc, |k| {
            if k < lo {
                Ordering::Greater
            } else if k > hi {
                Ordering::Less
            } else {
                Ordering::Equal
            }
        })?;
        let expected: Vec<i64> = model.range(lo..=hi).copied().collect();
        assert_eq!(got, expected, "range [{lo}, {hi}] disagreed with model");
    }

    Ok(())
}
