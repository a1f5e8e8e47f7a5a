//! In-memory page cache.
//!
//! The cache holds a bounded number of deserialized nodes keyed by page
//! offset, with a recency list deciding evictions. The tree owns the cache
//! and mediates all disk traffic, so eviction here only *returns* the
//! victim; writing a dirty victim back is the tree's job.
//!
//! # Take/put discipline
//! Mutating descents do not borrow nodes inside the cache. They
//! [`take`](PageCache::take) a node out, mutate it while it is owned by the
//! call stack, and [`insert`](PageCache::insert) it back afterwards. A node
//! that is out of the cache cannot be evicted, which is what pins the
//! current descent path. The root never enters the cache at all.

use std::collections::{HashMap, VecDeque};

use crate::common::PageOffset;
use crate::tree::node::Node;
use crate::tree::record::Record;

/// Bounded node cache with least-recently-touched eviction.
pub(crate) struct PageCache<R: Record> {
    /// Resident nodes by page offset.
    map: HashMap<i64, Node<R>>,
    /// Offsets ordered by recency, most recent at the front. Contains
    /// exactly the offsets present in `map`.
    order: VecDeque<i64>,
    capacity: usize,
}

impl<R: Record> PageCache<R> {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "cache capacity must be at least 1");
        Self {
            map: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn contains(&self, offset: PageOffset) -> bool {
        self.map.contains_key(&offset.0)
    }

    /// Remove and return the node at `offset`, if resident.
    pub(crate) fn take(&mut self, offset: PageOffset) -> Option<Node<R>> {
        let node = self.map.remove(&offset.0)?;
        self.order.retain(|o| *o != offset.0);
        Some(node)
    }

    /// Insert a node as most recently touched, evicting the least recently
    /// touched node if the cache is over capacity. The evicted node is
    /// returned for the caller to write back if dirty.
    ///
    /// # Panics
    /// Panics if a different node is already resident at the same offset.
    /// Two live nodes claiming one page means structural corruption, and
    /// continuing would let one silently overwrite the other.
    pub(crate) fn insert(&mut self, node: Node<R>) -> Option<Node<R>> {
        let offset = node.offset().0;
        if self.map.insert(offset, node).is_some() {
            panic!("two nodes resident at page offset {}", offset);
        }
        self.order.push_front(offset);

        if self.map.len() > self.capacity {
            let victim_offset = self.order.pop_back().expect("order list empty over capacity");
            let victim = self
                .map
                .remove(&victim_offset)
                .expect("recency list out of sync with cache map");
            return Some(victim);
        }
        None
    }

    /// Move `offset` to the front of the recency order and return a shared
    /// reference to its node, if resident.
    pub(crate) fn touch(&mut self, offset: PageOffset) -> Option<&Node<R>> {
        if !self.map.contains_key(&offset.0) {
            return None;
        }
        if self.order.front() != Some(&offset.0) {
            self.order.retain(|o| *o != offset.0);
            self.order.push_front(offset.0);
        }
        self.map.get(&offset.0)
    }

    /// Empty the cache, yielding every resident node for write-back.
    pub(crate) fn drain(&mut self) -> Vec<Node<R>> {
        self.order.clear();
        self.map.drain().map(|(_, node)| node).collect()
    }
}
