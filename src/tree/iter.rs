//! Record iterators.
//!
//! Iterators walk the doubly linked leaf chain, buffering one leaf's
//! records at a time, so a full scan touches each page once and never
//! visits inner pages past the initial descent.
//!
//! Each iterator borrows the tree mutably for its whole lifetime. That is
//! what lets `next` fault pages through the cache, and it makes mutation
//! during iteration a compile error rather than a runtime hazard. Page
//! faults can fail, so the item type is `Result<R>`; after an error the
//! iterator is exhausted.

use crate::common::{PageOffset, Result};
use crate::tree::record::Record;
use crate::tree::bptree::BPTree;

/// Forward iterator over all records in ascending order.
///
/// Created by [`BPTree::iter`].
pub struct Iter<'t, R: Record> {
    tree: &'t mut BPTree<R>,
    buf: std::vec::IntoIter<R>,
    next_leaf: PageOffset,
    done: bool,
}

/// Reverse iterator over all records in descending order.
///
/// Created by [`BPTree::iter_rev`].
pub struct RevIter<'t, R: Record> {
    tree: &'t mut BPTree<R>,
    /// Remaining records of the current leaf, consumed from the back.
    buf: Vec<R>,
    prev_leaf: PageOffset,
    done: bool,
}

/// Forward iterator over the records of a single key, in ascending record
/// order.
///
/// Created by [`BPTree::iter_for_key`].
pub struct KeyIter<'t, R: Record> {
    tree: &'t mut BPTree<R>,
    key: R::Key,
    buf: std::vec::IntoIter<R>,
    next_leaf: PageOffset,
    done: bool,
}

/// Clone one leaf's records and its chain neighbors out of the tree.
fn leaf_snapshot<R: Record>(
    tree: &mut BPTree<R>,
    offset: PageOffset,
) -> Result<(Vec<R>, PageOffset, PageOffset)> {
    let session = tree.session_mut()?;
    let leaf = session.node_at(offset)?.leaf();
    Ok((leaf.records.clone(), leaf.left, leaf.right))
}

impl<R: Record> Iterator for Iter<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(rec) = self.buf.next() {
                return Some(Ok(rec));
            }
            if !self.next_leaf.is_valid() {
                self.done = true;
                return None;
            }
            match leaf_snapshot(self.tree, self.next_leaf) {
                Ok((records, _, right)) => {
                    self.buf = records.into_iter();
                    self.next_leaf = right;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Record> Iterator for RevIter<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(rec) = self.buf.pop() {
                return Some(Ok(rec));
            }
            if !self.prev_leaf.is_valid() {
                self.done = true;
                return None;
            }
            match leaf_snapshot(self.tree, self.prev_leaf) {
                Ok((records, left, _)) => {
                    self.buf = records;
                    self.prev_leaf = left;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Record> Iterator for KeyIter<'_, R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        if self.done {
            return None;
        }
        loop {
            if let Some(rec) = self.buf.next() {
                // the run ends at the first record with another key
                if rec.key() != self.key {
                    self.done = true;
                    return None;
                }
                return Some(Ok(rec));
            }
            if !self.next_leaf.is_valid() {
                self.done = true;
                return None;
            }
            match leaf_snapshot(self.tree, self.next_leaf) {
                Ok((records, _, right)) => {
                    self.buf = records.into_iter();
                    self.next_leaf = right;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Record> BPTree<R> {
    /// Iterate over all records in ascending full record order.
    ///
    /// The borrow rules prevent mutating the tree while an iterator is
    /// alive; collect first if removals based on the scan are needed.
    pub fn iter(&mut self) -> Result<Iter<'_, R>> {
        let (buf, next_leaf) = {
            let session = self.session_mut()?;
            let offset = session.locate_leaf(None)?;
            let leaf = session.node_at(offset)?.leaf();
            (leaf.records.clone(), leaf.right)
        };
        Ok(Iter {
            tree: self,
            buf: buf.into_iter(),
            next_leaf,
            done: false,
        })
    }

    /// Iterate over all records in descending full record order.
    pub fn iter_rev(&mut self) -> Result<RevIter<'_, R>> {
        let (buf, prev_leaf) = {
            let session = self.session_mut()?;
            let offset = session.locate_rightmost_leaf()?;
            let leaf = session.node_at(offset)?.leaf();
            (leaf.records.clone(), leaf.left)
        };
        Ok(RevIter {
            tree: self,
            buf,
            prev_leaf,
            done: false,
        })
    }

    /// Iterate over every record with the given key, in ascending record
    /// order. Lazy counterpart of
    /// [`records_for_key`](BPTree::records_for_key).
    pub fn iter_for_key(&mut self, key: R::Key) -> Result<KeyIter<'_, R>> {
        let (buf, next_leaf) = {
            let session = self.session_mut()?;
            let (offset, pos) = session.locate_key_run(&key)?;
            let leaf = session.node_at(offset)?.leaf();
            if pos < leaf.records.len() && leaf.records[pos].key() == key {
                (leaf.records[pos..].to_vec(), leaf.right)
            } else {
                (Vec::new(), PageOffset::NONE)
            }
        };
        Ok(KeyIter {
            tree: self,
            key,
            buf: buf.into_iter(),
            next_leaf,
            done: false,
        })
    }
}
