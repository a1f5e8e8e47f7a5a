//! bptree - an on-disk B+tree index over fixed-size records.
//!
//! # Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        BPTree<R>                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │            Tree Layer (tree/)                     │   │
//! │  │   add / remove / get / range / iterators          │   │
//! │  │   split, borrow, merge rebalancing                │   │
//! │  │   bottom-up bulk loader                           │   │
//! │  └──────────────────────────────────────────────────┘   │
//! │                          ↓                               │
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │         Page Cache (tree/cache)                   │   │
//! │  │   bounded, recency eviction, dirty write-back     │   │
//! │  └──────────────────────────────────────────────────┘   │
//! │                          ↓                               │
//! │  ┌──────────────────────────────────────────────────┐   │
//! │  │          Storage Layer (storage/)                 │   │
//! │  │   DiskManager + free-page pool + TreeSnapshot     │   │
//! │  └──────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageOffset, Error, config)
//! - [`storage`] - Page-granular file I/O and metadata persistence
//! - [`tree`] - The B+tree itself: nodes, cache, algorithms, iterators
//!
//! # Quick Start
//! ```no_run
//! use bptree::{BPTree, Key, Record};
//!
//! #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
//! struct Entry {
//!     id: i64,
//! }
//!
//! impl Record for Entry {
//!     type Key = i64;
//!     const SIZE: usize = 8;
//!     fn key(&self) -> i64 {
//!         self.id
//!     }
//!     fn write_to(&self, buf: &mut [u8]) {
//!         buf.copy_from_slice(&self.id.to_le_bytes());
//!     }
//!     fn read_from(buf: &[u8]) -> Self {
//!         Entry { id: i64::from_le_bytes(buf.try_into().unwrap()) }
//!     }
//! }
//!
//! let mut tree: BPTree<Entry> = BPTree::new("entries.idx");
//! tree.open_new()?;
//! tree.add(Entry { id: 42 })?;
//! assert!(tree.get(&42)?.is_some());
//! tree.close()?;
//! # Ok::<(), bptree::Error>(())
//! ```

pub mod common;
pub mod storage;
pub mod tree;

// Re-export commonly used items at crate root for convenience
pub use common::config::{DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE};
pub use common::{Error, PageOffset, Result};

pub use storage::{DiskManager, TreeSnapshot};
pub use tree::{BPTree, Iter, Key, KeyIter, Record, RevIter, TreeStats};
