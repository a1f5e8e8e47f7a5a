//! Inner pages.
//!
//! An inner page holds `n` separator keys and `n + 1` child offsets. Child
//! `i` covers keys up to and including separator `i`; the last child covers
//! everything above the last separator.
//!
//! Duplicate keys make routing asymmetric. When a key run was split across
//! pages, equal keys may sit on both sides of a separator equal to them, so
//! lookups and insertions resolve ties differently:
//! - [`route_for_key`](InnerNode::route_for_key) steps left across equal
//!   separators before descending, landing on the leftmost subtree that can
//!   hold the key.
//! - [`route_for_insert`](InnerNode::route_for_insert) descends just right
//!   of the matched separator, appending new duplicates after existing ones.

use crate::common::config::INNER_HEADER_SIZE;
use crate::common::{Error, PageOffset, Result};
use crate::tree::record::Key;

/// An inner page held in memory.
///
/// # Wire Format
/// All integers little-endian; `n` keys are followed by `n + 1` child
/// offsets:
/// ```text
/// ┌─────┬───────┬──────────────┬───────────────────────┐
/// │ tag │ count │ keys (n × K) │ children ((n+1) × i64)│
/// │ 1B  │ i32   │              │                       │
/// └─────┴───────┴──────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub(crate) struct InnerNode<K: Key> {
    /// File offset of this page.
    pub(crate) offset: PageOffset,
    /// Separator keys in ascending order.
    pub(crate) keys: Vec<K>,
    /// Child page offsets, one more than keys.
    pub(crate) children: Vec<PageOffset>,
    /// True if the in-memory state differs from disk.
    pub(crate) dirty: bool,
}

impl<K: Key> InnerNode<K> {
    /// Create an empty inner page at `offset`, to be filled by a bulk load.
    pub(crate) fn new(offset: PageOffset) -> Self {
        Self {
            offset,
            keys: Vec::new(),
            children: Vec::new(),
            dirty: true,
        }
    }

    /// Create a fresh root over two children separated by `key`, as
    /// produced by a root split.
    pub(crate) fn new_root(offset: PageOffset, left: PageOffset, key: K, right: PageOffset) -> Self {
        Self {
            offset,
            keys: vec![key],
            children: vec![left, right],
            dirty: true,
        }
    }

    /// Child index to descend into when looking up `key`.
    ///
    /// On a separator tie, walks left across equal separators and descends
    /// immediately right of the first, so lookups start at the leftmost
    /// subtree that can contain the key.
    pub(crate) fn route_for_key(&self, key: &K) -> usize {
        match self.keys.binary_search(key) {
            Ok(mut pos) => {
                while pos > 0 && self.keys[pos - 1] == *key {
                    pos -= 1;
                }
                pos + 1
            }
            Err(pos) => pos,
        }
    }

    /// Child index to descend into when inserting a record with `key`.
    ///
    /// On a separator tie, descends right of the matched separator so that
    /// new duplicates land after existing ones.
    pub(crate) fn route_for_insert(&self, key: &K) -> usize {
        match self.keys.binary_search(key) {
            Ok(pos) => pos + 1,
            Err(pos) => pos,
        }
    }

    /// Record a child split: `key` separates the existing child at position
    /// `pos` from its new right neighbor. The page must not be full.
    pub(crate) fn insert_from_child(&mut self, pos: usize, key: K, right_child: PageOffset) {
        self.keys.insert(pos, key);
        self.children.insert(pos + 1, right_child);
        self.dirty = true;
    }

    /// Record a child split into a full page by splitting this page too.
    ///
    /// The incoming separator is inserted virtually, then the upper half of
    /// keys and children moves to a fresh page at `right_offset`. The key
    /// left in the middle is promoted to the caller rather than kept in
    /// either half. When the incoming separator itself lands on the middle,
    /// it is the one promoted.
    pub(crate) fn split_insert(
        &mut self,
        pos: usize,
        key: K,
        right_child: PageOffset,
        capacity: usize,
        right_offset: PageOffset,
    ) -> (K, InnerNode<K>) {
        debug_assert_eq!(self.keys.len(), capacity);

        self.keys.insert(pos, key);
        self.children.insert(pos + 1, right_child);

        let n_left = capacity / 2;
        let mut right_keys = self.keys.split_off(n_left);
        let promoted = right_keys.remove(0);
        let right_children = self.children.split_off(n_left + 1);
        self.dirty = true;

        let mut right = InnerNode::new(right_offset);
        right.keys = right_keys;
        right.children = right_children;
        (promoted, right)
    }

    /// Serialize into a page-sized buffer. Bytes past the last child offset
    /// are left as they are.
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        debug_assert_eq!(self.children.len(), self.keys.len() + 1);

        buf[0] = super::node::TAG_INNER;
        buf[1..5].copy_from_slice(&(self.keys.len() as i32).to_le_bytes());

        let mut at = 5;
        for key in &self.keys {
            key.write_to(&mut buf[at..at + K::SIZE]);
            at += K::SIZE;
        }
        for child in &self.children {
            buf[at..at + 8].copy_from_slice(&child.0.to_le_bytes());
            at += 8;
        }
    }

    /// Deserialize an inner page at `offset` from a page-sized buffer. The
    /// tag byte has already been checked by the caller.
    pub(crate) fn read_from(offset: PageOffset, buf: &[u8]) -> Result<Self> {
        let count = i32::from_le_bytes(buf[1..5].try_into().unwrap());
        let n = count as usize;

        if count < 0 || INNER_HEADER_SIZE + n * (K::SIZE + 8) > buf.len() {
            return Err(Error::Corrupt(format!(
                "inner page at {} has key count {}",
                offset, count
            )));
        }

        let mut keys = Vec::with_capacity(n);
        let mut at = 5;
        for _ in 0..n {
            keys.push(K::read_from(&buf[at..at + K::SIZE]));
            at += K::SIZE;
        }
        let mut children = Vec::with_capacity(n + 1);
        for _ in 0..n + 1 {
            children.push(PageOffset::new(i64::from_le_bytes(
                buf[at..at + 8].try_into().unwrap(),
            )));
            at += 8;
        }

        Ok(Self {
            offset,
            keys,
            children,
            dirty: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::fixtures::IntKey;

    fn inner_with(keys: &[i32]) -> InnerNode<IntKey> {
        let mut node = InnerNode::new(PageOffset::new(0));
        node.keys = keys.iter().map(|k| IntKey(*k)).collect();
        node.children = (0..=keys.len() as i64)
            .map(|i| PageOffset::new(i * 256))
            .collect();
        node
    }

    #[test]
    fn test_route_for_key_no_tie() {
        let node = inner_with(&[10, 20, 30]);
        assert_eq!(node.route_for_key(&IntKey(5)), 0);
        assert_eq!(node.route_for_key(&IntKey(15)), 1);
        assert_eq!(node.route_for_key(&IntKey(35)), 3);
    }

    #[test]
    fn test_route_for_key_scans_left_over_equal_separators() {
        let node = inner_with(&[10, 20, 20, 20, 30]);
        // leftmost equal separator is index 1, descend right of it
        assert_eq!(node.route_for_key(&IntKey(20)), 2);
    }

    #[test]
    fn test_route_for_insert_steps_right_once() {
        let node = inner_with(&[10, 20, 30]);
        assert_eq!(node.route_for_insert(&IntKey(20)), 2);
        assert_eq!(node.route_for_insert(&IntKey(25)), 2);
        assert_eq!(node.route_for_insert(&IntKey(5)), 0);
    }

    #[test]
    fn test_insert_from_child() {
        let mut node = inner_with(&[10, 30]);
        node.insert_from_child(1, IntKey(20), PageOffset::new(1024));

        assert_eq!(node.keys, vec![IntKey(10), IntKey(20), IntKey(30)]);
        assert_eq!(node.children[2], PageOffset::new(1024));
        assert_eq!(node.children.len(), 4);
    }

    #[test]
    fn test_split_insert_promotes_middle() {
        // capacity 4, incoming key lands in the lower half
        let mut node = inner_with(&[10, 20, 30, 40]);
        let (promoted, right) =
            node.split_insert(0, IntKey(5), PageOffset::new(999), 4, PageOffset::new(4096));

        // after virtual insert: [5, 10, 20, 30, 40], middle of the split is 20
        assert_eq!(promoted, IntKey(20));
        assert_eq!(node.keys, vec![IntKey(5), IntKey(10)]);
        assert_eq!(right.keys, vec![IntKey(30), IntKey(40)]);
        assert_eq!(node.children.len(), node.keys.len() + 1);
        assert_eq!(right.children.len(), right.keys.len() + 1);
        assert_eq!(right.offset, PageOffset::new(4096));
    }

    #[test]
    fn test_split_insert_promotes_incoming_key() {
        // the incoming separator lands exactly on the split point
        let mut node = inner_with(&[10, 20, 30, 40]);
        let (promoted, right) =
            node.split_insert(2, IntKey(25), PageOffset::new(999), 4, PageOffset::new(4096));

        assert_eq!(promoted, IntKey(25));
        assert_eq!(node.keys, vec![IntKey(10), IntKey(20)]);
        assert_eq!(right.keys, vec![IntKey(30), IntKey(40)]);
        // the new child travels with the promoted key's right side
        assert_eq!(right.children[0], PageOffset::new(999));
    }

    #[test]
    fn test_wire_roundtrip() {
        let node = inner_with(&[7, 14, 21]);
        let mut buf = vec![0u8; 256];
        node.write_to(&mut buf);
        assert_eq!(buf[0], crate::tree::node::TAG_INNER);

        let back = InnerNode::<IntKey>::read_from(PageOffset::new(0), &buf).unwrap();
        assert_eq!(back.keys, node.keys);
        assert_eq!(back.children, node.children);
        assert!(!back.dirty);
    }

    #[test]
    fn test_read_rejects_bad_count() {
        let mut buf = vec![0u8; 64];
        buf[0] = crate::tree::node::TAG_INNER;
        buf[1..5].copy_from_slice(&500i32.to_le_bytes());
        assert!(InnerNode::<IntKey>::read_from(PageOffset::new(0), &buf).is_err());
    }
}
