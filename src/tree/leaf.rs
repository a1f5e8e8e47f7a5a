//! Leaf pages.
//!
//! A leaf stores records sorted by their full order and links to its left
//! and right siblings, forming a doubly linked chain across the bottom of
//! the tree. Iteration and range scans walk this chain without touching
//! inner pages.

use crate::common::config::LEAF_HEADER_SIZE;
use crate::common::{Error, PageOffset, Result};
use crate::tree::record::Record;

/// A leaf page held in memory.
///
/// # Wire Format
/// All integers little-endian:
/// ```text
/// ┌─────┬──────────────┬───────────────┬───────┬────────────────────┐
/// │ tag │ left sibling │ right sibling │ count │ records (count × S)│
/// │ 1B  │ i64          │ i64           │ i32   │                    │
/// └─────┴──────────────┴───────────────┴───────┴────────────────────┘
/// ```
#[derive(Debug, Clone)]
pub(crate) struct LeafNode<R: Record> {
    /// File offset of this page.
    pub(crate) offset: PageOffset,
    /// Left sibling in the leaf chain, `NONE` at the leftmost leaf.
    pub(crate) left: PageOffset,
    /// Right sibling in the leaf chain, `NONE` at the rightmost leaf.
    pub(crate) right: PageOffset,
    /// Records in ascending full order.
    pub(crate) records: Vec<R>,
    /// True if the in-memory state differs from disk.
    pub(crate) dirty: bool,
}

impl<R: Record> LeafNode<R> {
    /// Create an empty leaf at `offset`, not yet written to disk.
    pub(crate) fn new(offset: PageOffset) -> Self {
        Self {
            offset,
            left: PageOffset::NONE,
            right: PageOffset::NONE,
            records: Vec::new(),
            dirty: true,
        }
    }

    /// Binary search for any record with the given key.
    ///
    /// With duplicate keys present, `Ok` may point at any of them.
    pub(crate) fn search_key(&self, key: &R::Key) -> std::result::Result<usize, usize> {
        self.records.binary_search_by(|r| r.key().cmp(key))
    }

    /// Position of the first record with the given key, or the insertion
    /// point if the key is absent.
    pub(crate) fn leftmost_key_position(&self, key: &R::Key) -> std::result::Result<usize, usize> {
        match self.search_key(key) {
            Ok(mut pos) => {
                while pos > 0 && self.records[pos - 1].key() == *key {
                    pos -= 1;
                }
                Ok(pos)
            }
            Err(pos) => Err(pos),
        }
    }

    /// Insert `rec` at `pos` into a full leaf and split off the upper half
    /// into a fresh leaf at `right_offset`.
    ///
    /// `pos` is the insertion point from a failed binary search and
    /// `capacity` the configured leaf capacity, which `records` is at.
    /// Returns the separator to push into the parent (the first key of the
    /// new right leaf) along with the right leaf itself. Sibling links are
    /// the caller's responsibility.
    pub(crate) fn split_insert(
        &mut self,
        pos: usize,
        rec: R,
        capacity: usize,
        right_offset: PageOffset,
    ) -> (R::Key, LeafNode<R>) {
        debug_assert_eq!(self.records.len(), capacity);

        let mid = capacity / 2;
        self.records.insert(pos, rec);
        // keep the record at the old midpoint as the first of the right leaf
        let split_at = if pos <= mid { mid + 1 } else { mid };
        let right_records = self.records.split_off(split_at);
        let sep = right_records[0].key();
        self.dirty = true;

        let mut right = LeafNode::new(right_offset);
        right.records = right_records;
        (sep, right)
    }

    /// Remove the exact record, comparing by full order. Returns whether it
    /// was present.
    pub(crate) fn remove(&mut self, rec: &R) -> bool {
        match self.records.binary_search(rec) {
            Ok(pos) => {
                self.records.remove(pos);
                self.dirty = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Serialize into a page-sized buffer. Bytes past the last record are
    /// left as they are.
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        buf[0] = super::node::TAG_LEAF;
        buf[1..9].copy_from_slice(&self.left.0.to_le_bytes());
        buf[9..17].copy_from_slice(&self.right.0.to_le_bytes());
        buf[17..21].copy_from_slice(&(self.records.len() as i32).to_le_bytes());

        let mut at = LEAF_HEADER_SIZE;
        for rec in &self.records {
            rec.write_to(&mut buf[at..at + R::SIZE]);
            at += R::SIZE;
        }
    }

    /// Deserialize a leaf at `offset` from a page-sized buffer. The tag
    /// byte has already been checked by the caller.
    pub(crate) fn read_from(offset: PageOffset, buf: &[u8]) -> Result<Self> {
        let left = i64::from_le_bytes(buf[1..9].try_into().unwrap());
        let right = i64::from_le_bytes(buf[9..17].try_into().unwrap());
        let count = i32::from_le_bytes(buf[17..21].try_into().unwrap());

        if count < 0 || LEAF_HEADER_SIZE + count as usize * R::SIZE > buf.len() {
            return Err(Error::Corrupt(format!(
                "leaf at {} has record count {}",
                offset, count
            )));
        }

        let mut records = Vec::with_capacity(count as usize);
        let mut at = LEAF_HEADER_SIZE;
        for _ in 0..count {
            records.push(R::read_from(&buf[at..at + R::SIZE]));
            at += R::SIZE;
        }

        Ok(Self {
            offset,
            left: PageOffset::new(left),
            right: PageOffset::new(right),
            records,
            dirty: false,
        })
    }
}
