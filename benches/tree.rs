//! Benchmarks for the core tree operations.
//!
//! Measures incremental insertion against bulk loading, point lookups
//! under a cold-ish cache, and full leaf-chain scans.

use std::hint::black_box;

use bptree::{BPTree, Record};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Row {
    id: i64,
    payload: u64,
}

impl Record for Row {
    type Key = i64;
    const SIZE: usize = 16;

    fn key(&self) -> i64 {
        self.id
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.payload.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Row {
            id: i64::from_le_bytes(buf[..8].try_into().unwrap()),
            payload: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        }
    }
}

fn open_tree(path: &std::path::Path) -> BPTree<Row> {
    let mut tree = BPTree::new(path);
    tree.set_cache_capacity(64).unwrap();
    tree.open_new().unwrap();
    tree
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for count in [1_000i64, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            b.iter_with_setup(
                || tempdir().unwrap(),
                |dir| {
                    let mut tree = open_tree(&dir.path().join("bench.idx"));
                    for id in 0..count {
                        tree.add(Row { id, payload: 0 }).unwrap();
                    }
                    (dir, tree)
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let mut ids: Vec<i64> = (0..count).collect();
                    ids.shuffle(&mut rand::rngs::StdRng::seed_from_u64(7));
                    (tempdir().unwrap(), ids)
                },
                |(dir, ids)| {
                    let mut tree = open_tree(&dir.path().join("bench.idx"));
                    for id in ids {
                        tree.add(Row { id, payload: 0 }).unwrap();
                    }
                    (dir, tree)
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("bulk_load", count), &count, |b, &count| {
            b.iter_with_setup(
                || tempdir().unwrap(),
                |dir| {
                    let mut tree: BPTree<Row> = BPTree::new(dir.path().join("bench.idx"));
                    tree.set_cache_capacity(64).unwrap();
                    tree.open_and_bulk_load(
                        (0..count).map(|id| Row { id, payload: 0 }),
                        count as usize,
                    )
                    .unwrap();
                    (dir, tree)
                },
            );
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let count = 10_000i64;
    let dir = tempdir().unwrap();
    let mut tree: BPTree<Row> = BPTree::new(dir.path().join("bench.idx"));
    tree.set_cache_capacity(64).unwrap();
    tree.open_and_bulk_load((0..count).map(|id| Row { id, payload: 0 }), count as usize)
        .unwrap();

    let mut keys: Vec<i64> = (0..count).collect();
    keys.shuffle(&mut rand::rngs::StdRng::seed_from_u64(11));

    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function("point_get", |b| {
        b.iter(|| {
            for &key in &keys {
                black_box(tree.get(&key).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let count = 10_000i64;
    let dir = tempdir().unwrap();
    let mut tree: BPTree<Row> = BPTree::new(dir.path().join("bench.idx"));
    tree.set_cache_capacity(64).unwrap();
    tree.open_and_bulk_load((0..count).map(|id| Row { id, payload: 0 }), count as usize)
        .unwrap();

    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Elements(count as u64));
    group.bench_function("full_forward", |b| {
        b.iter(|| {
            let mut sum = 0i64;
            for rec in tree.iter().unwrap() {
                sum += rec.unwrap().id;
            }
            black_box(sum)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_scan);
criterion_main!(benches);
