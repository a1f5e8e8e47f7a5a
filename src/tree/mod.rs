//! B+tree index - ordered record storage over fixed-size disk pages.
//!
//! The tree keeps all records in leaf pages linked into a doubly-linked
//! chain; inner pages hold only separator keys and child offsets. Pages
//! move through a bounded in-memory [`cache`] and are written back to
//! disk on eviction or close.
//!
//! - [`BPTree`] - The index itself: add, remove, lookups, iteration
//! - [`Record`] / [`Key`] - Fixed-size serialization traits for stored data
//! - [`Iter`], [`RevIter`], [`KeyIter`] - Leaf-chain iterators
//! - [`TreeStats`] - Cache and I/O counters

mod bptree;
mod bulk;
mod cache;
mod inner;
mod iter;
mod leaf;
mod node;
pub mod record;
mod stats;

pub use bptree::BPTree;
pub use iter::{Iter, KeyIter, RevIter};
pub use record::{Key, Record};
pub use stats::TreeStats;
