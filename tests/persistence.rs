//! Integration tests for closing, snapshotting, and reopening trees.

mod common;

use bptree::{BPTree, Error};
use common::Pair;
use tempfile::tempdir;

fn build(path: &std::path::Path, n: i32) -> BPTree<Pair> {
    let mut tree = BPTree::new(path);
    tree.set_page_size(256).unwrap();
    tree.set_cache_capacity(16).unwrap();
    tree.open_new().unwrap();
    for id in 0..n {
        tree.add(Pair::new(id, 0)).unwrap();
    }
    tree
}

#[test]
fn test_close_snapshot_reopen() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("tree.idx");
    let snap = dir.path().join("tree.snap");

    let mut tree = build(&index, 1_000);
    tree.close().unwrap();
    tree.store_snapshot(&snap).unwrap();

    let mut reopened: BPTree<Pair> = BPTree::from_snapshot(&index, &snap).unwrap();
    assert!(!reopened.is_open());
    reopened.open().unwrap();

    assert_eq!(reopened.len(), 1_000);
    assert_eq!(reopened.get(&123).unwrap(), Some(Pair::new(123, 0)));
    assert_eq!(reopened.min().unwrap(), Some(0));
    assert_eq!(reopened.max().unwrap(), Some(999));
    reopened.check_integrity().unwrap();

    let ids: Vec<i32> = reopened.iter().unwrap().map(|r| r.unwrap().id).collect();
    assert_eq!(ids, (0..1_000).collect::<Vec<i32>>());
}

#[test]
fn test_reopened_tree_accepts_writes() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("tree.idx");
    let snap = dir.path().join("tree.snap");

    let mut tree = build(&index, 500);
    tree.close().unwrap();
    tree.store_snapshot(&snap).unwrap();

    let mut reopened: BPTree<Pair> = BPTree::from_snapshot(&index, &snap).unwrap();
    reopened.open().unwrap();
    for id in 500..800 {
        assert!(reopened.add(Pair::new(id, 0)).unwrap());
    }
    for id in 0..100 {
        assert!(reopened.remove(&Pair::new(id, 0)).unwrap());
    }
    assert_eq!(reopened.len(), 700);
    reopened.check_integrity().unwrap();
}

#[test]
fn test_read_only_reopen_rejects_mutation() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("tree.idx");
    let snap = dir.path().join("tree.snap");

    let mut tree = build(&index, 200);
    tree.close().unwrap();
    tree.store_snapshot(&snap).unwrap();

    let mut reader: BPTree<Pair> = BPTree::from_snapshot(&index, &snap).unwrap();
    reader.open_read_only().unwrap();
    assert!(reader.is_read_only());

    assert_eq!(reader.get(&42).unwrap(), Some(Pair::new(42, 0)));
    assert_eq!(reader.range(&10, &20).unwrap().len(), 11);
    assert!(matches!(reader.add(Pair::new(999, 0)), Err(Error::ReadOnly)));
    assert!(matches!(
        reader.remove(&Pair::new(42, 0)),
        Err(Error::ReadOnly)
    ));
    reader.close().unwrap();
}

#[test]
fn test_free_pool_survives_reopen() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("tree.idx");
    let snap = dir.path().join("tree.snap");

    let mut tree = build(&index, 1_000);
    for id in 300..1_000 {
        tree.remove(&Pair::new(id, 0)).unwrap();
    }
    tree.close().unwrap();
    tree.store_snapshot(&snap).unwrap();

    let mut reopened: BPTree<Pair> = BPTree::from_snapshot(&index, &snap).unwrap();
    reopened.open().unwrap();
    let pages_before = reopened.page_count();

    // Regrowing into the deleted key range should mostly reuse the freed
    // pages instead of extending the file.
    for id in 300..1_000 {
        reopened.add(Pair::new(id, 0)).unwrap();
    }
    assert!(reopened.page_count() <= pages_before + 8);
    reopened.check_integrity().unwrap();
}

#[test]
fn test_snapshot_of_missing_file_fails() {
    let dir = tempdir().unwrap();
    let Err(err) =
        BPTree::<Pair>::from_snapshot(dir.path().join("tree.idx"), dir.path().join("no.snap"))
    else {
        panic!("snapshot load without a snapshot file succeeded");
    };
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_bulk_loaded_tree_survives_reopen() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("tree.idx");
    let snap = dir.path().join("tree.snap");

    let mut tree: BPTree<Pair> = BPTree::new(&index);
    tree.set_page_size(256).unwrap();
    tree.open_and_bulk_load((0..2_000).map(|id| Pair::new(id, 0)), 2_000)
        .unwrap();
    tree.close().unwrap();
    tree.store_snapshot(&snap).unwrap();

    let mut reopened: BPTree<Pair> = BPTree::from_snapshot(&index, &snap).unwrap();
    reopened.open().unwrap();
    assert_eq!(reopened.len(), 2_000);
    assert_eq!(reopened.get(&1_999).unwrap(), Some(Pair::new(1_999, 0)));
    reopened.check_integrity().unwrap();
}
