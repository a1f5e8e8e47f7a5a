//! Integration tests driving the tree through multi-level workloads.
//!
//! These exercise cross-component behavior the unit tests don't cover:
//! thousands of records across several inner levels, cache pressure far
//! below the working set, and bulk loading compared against incremental
//! construction.

mod common;

use bptree::BPTree;
use common::{Measurement, Pair};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

/// Small pages and a small cache so even modest workloads build
/// multi-level trees and churn the cache.
fn open_tree(path: &std::path::Path) -> BPTree<Pair> {
    let mut tree = BPTree::new(path);
    tree.set_page_size(256).unwrap();
    tree.set_cache_capacity(16).unwrap();
    tree.open_new().unwrap();
    tree
}

fn shuffled(n: i32, seed: u64) -> Vec<i32> {
    let mut ids: Vec<i32> = (0..n).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids
}

#[test]
fn test_incremental_build_matches_bulk_load() {
    let dir = tempdir().unwrap();
    let n = 5_000;

    let mut incremental = open_tree(&dir.path().join("incremental.idx"));
    for id in shuffled(n, 1) {
        assert!(incremental.add(Pair::new(id, 0)).unwrap());
    }

    let mut bulk: BPTree<Pair> = BPTree::new(dir.path().join("bulk.idx"));
    bulk.set_page_size(256).unwrap();
    bulk.set_cache_capacity(16).unwrap();
    bulk.open_and_bulk_load((0..n).map(|id| Pair::new(id, 0)), n as usize)
        .unwrap();

    assert_eq!(incremental.len(), bulk.len());
    assert_eq!(incremental.min().unwrap(), bulk.min().unwrap());
    assert_eq!(incremental.max().unwrap(), bulk.max().unwrap());
    incremental.check_integrity().unwrap();
    bulk.check_integrity().unwrap();

    // Bulk loading packs leaves full, so it can never be taller.
    assert!(bulk.height().unwrap() <= incremental.height().unwrap());

    let a: Vec<Pair> = incremental.iter().unwrap().map(|r| r.unwrap()).collect();
    let b: Vec<Pair> = bulk.iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(a, b);
    assert_eq!(a.len(), n as usize);
}

#[test]
fn test_delete_upper_half_then_scan() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir.path().join("tree.idx"));
    let n = 2_000;

    for id in shuffled(n, 2) {
        tree.add(Pair::new(id, 0)).unwrap();
    }
    for id in shuffled(n, 3) {
        if id >= n / 2 {
            assert!(tree.remove(&Pair::new(id, 0)).unwrap());
        }
    }

    assert_eq!(tree.len(), (n / 2) as u64);
    tree.check_integrity().unwrap();
    assert_eq!(tree.min().unwrap(), Some(0));
    assert_eq!(tree.max().unwrap(), Some(n / 2 - 1));

    let scanned: Vec<i32> = tree.iter().unwrap().map(|r| r.unwrap().id).collect();
    let expected: Vec<i32> = (0..n / 2).collect();
    assert_eq!(scanned, expected);

    let reversed: Vec<i32> = tree.iter_rev().unwrap().map(|r| r.unwrap().id).collect();
    let mut expected_rev = expected;
    expected_rev.reverse();
    assert_eq!(reversed, expected_rev);
}

#[test]
fn test_range_matches_linear_scan() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir.path().join("tree.idx"));

    // Sparse keys so range bounds often fall between stored keys.
    let ids: Vec<i32> = shuffled(1_000, 4).into_iter().map(|id| id * 7).collect();
    for &id in &ids {
        tree.add(Pair::new(id, 0)).unwrap();
    }
    let mut sorted = ids.clone();
    sorted.sort_unstable();

    for (low, high) in [(0, 6_993), (35, 36), (100, 700), (691, 691), (5_000, 1_000)] {
        let got: Vec<i32> = tree
            .range(&low, &high)
            .unwrap()
            .into_iter()
            .map(|rec| rec.id)
            .collect();
        let expected: Vec<i32> = sorted
            .iter()
            .copied()
            .filter(|&id| low <= id && id <= high)
            .collect();
        assert_eq!(got, expected, "range [{}, {}]", low, high);
    }
}

#[test]
fn test_duplicate_run_spanning_many_leaves() {
    let dir = tempdir().unwrap();
    let mut tree: BPTree<Measurement> = BPTree::new(dir.path().join("tree.idx"));
    tree.set_page_size(256).unwrap();
    tree.set_cache_capacity(16).unwrap();
    tree.open_new().unwrap();

    // Hundreds of records under a single key, flanked by neighbors.
    tree.add(Measurement::new(4, 0.0)).unwrap();
    tree.add(Measurement::new(6, 0.0)).unwrap();
    for i in 0..400 {
        assert!(tree.add(Measurement::new(5, i as f64 * 0.25)).unwrap());
    }
    tree.check_integrity().unwrap();

    let dups = tree.records_for_key(&5).unwrap();
    assert_eq!(dups.len(), 400);
    assert!(dups.windows(2).all(|w| w[0].value < w[1].value));

    let streamed: Vec<Measurement> = tree.iter_for_key(5).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(streamed, dups);

    assert!(tree.remove_key(&5).unwrap());
    assert_eq!(tree.len(), 2);
    assert_eq!(tree.records_for_key(&5).unwrap().len(), 0);
    tree.check_integrity().unwrap();
}

#[test]
fn test_cache_pressure_counters() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir.path().join("tree.idx"));

    for id in shuffled(3_000, 5) {
        tree.add(Pair::new(id, 0)).unwrap();
    }
    let stats = tree.stats().unwrap();

    // A 16-node cache cannot hold a 3000-record tree, so eviction and
    // re-reading must both have happened.
    assert!(stats.evictions > 0);
    assert!(stats.cache_misses > 0);
    assert!(stats.cache_hits > 0);
    assert!(stats.pages_written > 0);

    tree.reset_stats().unwrap();
    assert_eq!(tree.stats().unwrap(), bptree::TreeStats::default());
}

#[test]
fn test_interleaved_add_remove_churn() {
    let dir = tempdir().unwrap();
    let mut tree = open_tree(&dir.path().join("tree.idx"));

    // Grow and shrink in waves to force splits and merges over the same
    // key space repeatedly.
    for wave in 0..4 {
        for id in shuffled(1_200, 10 + wave) {
            tree.add(Pair::new(id, 0)).unwrap();
        }
        assert_eq!(tree.len(), 1_200);
        tree.check_integrity().unwrap();

        for id in shuffled(1_200, 20 + wave) {
            if id % 3 != 0 {
                assert!(tree.remove(&Pair::new(id, 0)).unwrap());
            }
        }
        assert_eq!(tree.len(), 400);
        tree.check_integrity().unwrap();

        for id in (0..1_200).filter(|id| id % 3 == 0) {
            assert!(tree.remove(&Pair::new(id, 0)).unwrap());
        }
        assert!(tree.is_empty());
        tree.check_integrity().unwrap();
    }
}
