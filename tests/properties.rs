//! Property-based tests comparing the tree against an in-memory model.

mod common;

use std::collections::BTreeSet;

use bptree::BPTree;
use common::Pair;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add(Pair),
    Remove(Pair),
    RemoveKey(i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // A narrow key range so operations collide often.
    let rec = (0..60i32, 0..4u32).prop_map(|(id, tag)| Pair::new(id, tag));
    prop_oneof![
        3 => rec.clone().prop_map(Op::Add),
        2 => rec.prop_map(Op::Remove),
        1 => (0..60i32).prop_map(Op::RemoveKey),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tree_matches_btreeset_model(ops in proptest::collection::vec(op_strategy(), 0..300)) {
        let dir = tempfile::tempdir().unwrap();
        let mut tree: BPTree<Pair> = BPTree::new(dir.path().join("tree.idx"));
        tree.set_page_size(128).unwrap();
        tree.set_cache_capacity(4).unwrap();
        tree.open_new().unwrap();

        let mut model: BTreeSet<Pair> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Add(rec) => {
                    prop_assert_eq!(tree.add(rec).unwrap(), model.insert(rec));
                }
                Op::Remove(rec) => {
                    prop_assert_eq!(tree.remove(&rec).unwrap(), model.remove(&rec));
                }
                Op::RemoveKey(id) => {
                    let had_key = model.iter().any(|rec| rec.id == id);
                    model.retain(|rec| rec.id != id);
                    prop_assert_eq!(tree.remove_key(&id).unwrap(), had_key);
                }
            }
            prop_assert_eq!(tree.len(), model.len() as u64);
        }

        tree.check_integrity().unwrap();
        let scanned: Vec<Pair> = tree.iter().unwrap().map(|r| r.unwrap()).collect();
        let expected: Vec<Pair> = model.iter().copied().collect();
        prop_assert_eq!(&scanned, &expected);

        if let Some(first) = expected.first() {
            prop_assert_eq!(tree.min().unwrap(), Some(first.id));
            prop_assert_eq!(tree.max().unwrap(), Some(expected.last().unwrap().id));
        } else {
            prop_assert_eq!(tree.min().unwrap(), None);
            prop_assert_eq!(tree.max().unwrap(), None);
        }
    }

    #[test]
    fn bulk_load_matches_sorted_input(ids in proptest::collection::btree_set(0..10_000i32, 0..500)) {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<Pair> = ids.iter().map(|&id| Pair::new(id, 0)).collect();

        let mut tree: BPTree<Pair> = BPTree::new(dir.path().join("tree.idx"));
        tree.set_page_size(128).unwrap();
        tree.set_cache_capacity(8).unwrap();
        tree.open_and_bulk_load(records.iter().copied(), records.len()).unwrap();

        tree.check_integrity().unwrap();
        prop_assert_eq!(tree.len(), records.len() as u64);
        let scanned: Vec<Pair> = tree.iter().unwrap().map(|r| r.unwrap()).collect();
        prop_assert_eq!(scanned, records);

        if let Some(&first) = ids.iter().next() {
            prop_assert_eq!(tree.get(&first).unwrap(), Some(Pair::new(first, 0)));
        }
        prop_assert_eq!(tree.get(&-1).unwrap(), None);
    }
}
