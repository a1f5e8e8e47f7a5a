//! The B+tree proper.
//!
//! [`BPTree`] ties the pieces together: a [`DiskManager`] for page I/O, a
//! [`PageCache`] for resident nodes, and the split/merge algorithms that
//! keep the tree balanced. Leaves hold the records; inner pages hold
//! separator keys. All leaves sit at the same depth and are chained to
//! their siblings in both directions.
//!
//! # Ownership during descents
//! Mutating descents pull each visited node *out* of the cache
//! ([`Session::take_node`]), hand it down the call stack by `&mut`, and
//! push it back afterwards ([`Session::put_node`]). While a node is out it
//! cannot be evicted, so the descent path is pinned without reference
//! counting. The root never enters the cache; it lives directly in the
//! session for as long as the tree is open.
//!
//! # Lifecycle
//! A tree is constructed closed, configured ([`set_page_size`],
//! [`set_cache_capacity`]), then opened with [`open_new`], [`open`],
//! [`open_read_only`] or [`open_and_bulk_load`]. [`close`] writes every
//! dirty page back and syncs the file. Reopening later needs the metadata
//! from a [`TreeSnapshot`], see [`store_snapshot`] and [`from_snapshot`].
//!
//! [`set_page_size`]: BPTree::set_page_size
//! [`set_cache_capacity`]: BPTree::set_cache_capacity
//! [`open_new`]: BPTree::open_new
//! [`open`]: BPTree::open
//! [`open_read_only`]: BPTree::open_read_only
//! [`open_and_bulk_load`]: BPTree::open_and_bulk_load
//! [`close`]: BPTree::close
//! [`store_snapshot`]: BPTree::store_snapshot
//! [`from_snapshot`]: BPTree::from_snapshot
//! [`TreeSnapshot`]: crate::storage::TreeSnapshot

use std::path::{Path, PathBuf};

use crate::common::config::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE, INNER_HEADER_SIZE, LEAF_HEADER_SIZE,
};
use crate::common::{Error, PageOffset, Result};
use crate::storage::{DiskManager, TreeSnapshot};
use crate::tree::cache::PageCache;
use crate::tree::inner::InnerNode;
use crate::tree::leaf::LeafNode;
use crate::tree::node::Node;
use crate::tree::record::{Key, Record};
use crate::tree::stats::TreeStats;

/// Node capacities derived from the page size and the record type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Geometry {
    pub(crate) page_size: usize,
    /// Records a leaf page can hold.
    pub(crate) leaf_capacity: usize,
    /// Minimum records in a non-root leaf before it must rebalance.
    pub(crate) min_leaf_fill: usize,
    /// Separator keys an inner page can hold.
    pub(crate) inner_capacity: usize,
    /// Minimum keys in a non-root inner page before it must rebalance.
    pub(crate) min_inner_fill: usize,
}

impl Geometry {
    fn for_record<R: Record>(page_size: usize) -> Self {
        let record_size = R::SIZE.max(1);
        let key_size = <R::Key as Key>::SIZE.max(1);
        let leaf_capacity = page_size.saturating_sub(LEAF_HEADER_SIZE) / record_size;
        let inner_capacity = page_size.saturating_sub(INNER_HEADER_SIZE) / (key_size + 8);
        Self {
            page_size,
            leaf_capacity,
            min_leaf_fill: leaf_capacity.saturating_sub(1) / 2 + 1,
            inner_capacity,
            min_inner_fill: inner_capacity / 2,
        }
    }
}

/// Result of an insertion step, bubbled up the descent path.
enum Planted<K> {
    /// Inserted without splitting.
    Done,
    /// An identical record already exists; nothing changed.
    Duplicate,
    /// The child split; `sep` and the new right page must be recorded in
    /// the parent.
    Split { sep: K, right_offset: PageOffset },
}

/// Everything that only exists while the tree is open.
pub(crate) struct Session<R: Record> {
    pub(crate) disk: DiskManager,
    pub(crate) cache: PageCache<R>,
    /// The root node, pinned outside the cache. `None` only transiently,
    /// while a mutating descent owns it.
    pub(crate) root: Option<Node<R>>,
    /// Scratch page buffer for serialization, reused across operations.
    buf: Vec<u8>,
    pub(crate) stats: TreeStats,
    pub(crate) read_only: bool,
    pub(crate) geo: Geometry,
}

impl<R: Record> Session<R> {
    pub(crate) fn new(disk: DiskManager, cache_capacity: usize, read_only: bool, geo: Geometry) -> Self {
        Self {
            disk,
            cache: PageCache::new(cache_capacity),
            root: None,
            buf: vec![0u8; geo.page_size],
            stats: TreeStats::default(),
            read_only,
            geo,
        }
    }

    pub(crate) fn root_offset(&self) -> PageOffset {
        self.root.as_ref().expect("tree root missing").offset()
    }

    fn write_node(&mut self, node: &Node<R>) -> Result<()> {
        self.buf.fill(0);
        node.write_to(&mut self.buf);
        self.disk.write_block(node.offset(), &self.buf)?;
        self.stats.pages_written += 1;
        Ok(())
    }

    pub(crate) fn load_node(&mut self, offset: PageOffset) -> Result<Node<R>> {
        self.disk.read_block(offset, &mut self.buf)?;
        self.stats.pages_read += 1;
        Node::read_from(offset, &self.buf)
    }

    /// Fetch a node for mutation, removing it from the cache so it cannot
    /// be evicted while the caller owns it.
    fn take_node(&mut self, offset: PageOffset) -> Result<Node<R>> {
        if let Some(node) = self.cache.take(offset) {
            self.stats.cache_hits += 1;
            return Ok(node);
        }
        self.stats.cache_misses += 1;
        self.load_node(offset)
    }

    /// Return a node to the cache, writing back whatever dirty node this
    /// pushes out.
    pub(crate) fn put_node(&mut self, node: Node<R>) -> Result<()> {
        if let Some(victim) = self.cache.insert(node) {
            self.stats.evictions += 1;
            if victim.is_dirty() {
                self.write_node(&victim)?;
            }
        }
        Ok(())
    }

    /// Borrow a node for reading, faulting it into the cache if necessary.
    /// The root is served from its pinned slot.
    pub(crate) fn node_at(&mut self, offset: PageOffset) -> Result<&Node<R>> {
        if self.root.as_ref().map(|r| r.offset()) == Some(offset) {
            return Ok(self.root.as_ref().expect("tree root missing"));
        }
        if self.cache.contains(offset) {
            self.stats.cache_hits += 1;
        } else {
            self.stats.cache_misses += 1;
            let node = self.load_node(offset)?;
            if let Some(victim) = self.cache.insert(node) {
                self.stats.evictions += 1;
                if victim.is_dirty() {
                    self.write_node(&victim)?;
                }
            }
        }
        Ok(self.cache.touch(offset).expect("node resident after load"))
    }

    /// Offset of the leaf a lookup for `key` lands in, or the leftmost
    /// leaf when `key` is `None`.
    pub(crate) fn locate_leaf(&mut self, key: Option<&R::Key>) -> Result<PageOffset> {
        let mut offset = self.root_offset();
        loop {
            let next = match self.node_at(offset)? {
                Node::Leaf(_) => return Ok(offset),
                Node::Inner(inner) => match key {
                    Some(k) => inner.children[inner.route_for_key(k)],
                    None => inner.children[0],
                },
            };
            offset = next;
        }
    }

    /// Offset of the rightmost leaf.
    pub(crate) fn locate_rightmost_leaf(&mut self) -> Result<PageOffset> {
        let mut offset = self.root_offset();
        loop {
            let next = match self.node_at(offset)? {
                Node::Leaf(_) => return Ok(offset),
                Node::Inner(inner) => *inner.children.last().expect("inner node has children"),
            };
            offset = next;
        }
    }

    /// Leaf offset and record position where the run of records carrying
    /// `key` begins, or where it would begin if absent.
    ///
    /// Splits place the separator at the right half's first key, so a
    /// duplicate run can straddle the split point and leave records equal
    /// to a separator in the child left of it. Routing alone therefore
    /// lands at most in the middle of a run; whenever the candidate
    /// position is the very first slot of its leaf the left sibling chain
    /// is walked back until the preceding record carries a smaller key.
    pub(crate) fn locate_key_run(&mut self, key: &R::Key) -> Result<(PageOffset, usize)> {
        let mut offset = self.locate_leaf(Some(key))?;
        let mut pos = {
            let leaf = self.node_at(offset)?.leaf();
            match leaf.leftmost_key_position(key) {
                Ok(pos) | Err(pos) => pos,
            }
        };
        while pos == 0 {
            let left = self.node_at(offset)?.leaf().left;
            if !left.is_valid() {
                break;
            }
            let continues_left = {
                let prev = self.node_at(left)?.leaf();
                prev.records.last().map_or(false, |r| r.key() == *key)
            };
            if !continues_left {
                break;
            }
            offset = left;
            pos = {
                let leaf = self.node_at(offset)?.leaf();
                match leaf.leftmost_key_position(key) {
                    Ok(pos) | Err(pos) => pos,
                }
            };
        }
        Ok((offset, pos))
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    fn insert_into(&mut self, node: &mut Node<R>, rec: R) -> Result<Planted<R::Key>> {
        let (pos, child_offset) = match node {
            Node::Leaf(leaf) => return self.leaf_insert(leaf, rec),
            Node::Inner(inner) => {
                let pos = inner.route_for_insert(&rec.key());
                (pos, inner.children[pos])
            }
        };

        let mut child = self.take_node(child_offset)?;
        let planted = match self.insert_into(&mut child, rec) {
            Ok(planted) => planted,
            Err(e) => {
                let _ = self.put_node(child);
                return Err(e);
            }
        };
        let (sep, right_offset) = match planted {
            Planted::Split { sep, right_offset } => (sep, right_offset),
            other => {
                self.put_node(child)?;
                return Ok(other);
            }
        };
        self.put_node(child)?;

        let inner = node.inner_mut();
        if inner.keys.len() < self.geo.inner_capacity {
            inner.insert_from_child(pos, sep, right_offset);
            Ok(Planted::Done)
        } else {
            let new_offset = self.disk.allocate();
            let (promoted, right) =
                inner.split_insert(pos, sep, right_offset, self.geo.inner_capacity, new_offset);
            self.put_node(Node::Inner(right))?;
            Ok(Planted::Split {
                sep: promoted,
                right_offset: new_offset,
            })
        }
    }

    fn leaf_insert(&mut self, leaf: &mut LeafNode<R>, rec: R) -> Result<Planted<R::Key>> {
        let pos = match leaf.records.binary_search(&rec) {
            Ok(_) => return Ok(Planted::Duplicate),
            Err(pos) => pos,
        };
        if leaf.records.len() < self.geo.leaf_capacity {
            leaf.records.insert(pos, rec);
            leaf.dirty = true;
            return Ok(Planted::Done);
        }

        let right_offset = self.disk.allocate();
        let (sep, mut right) = leaf.split_insert(pos, rec, self.geo.leaf_capacity, right_offset);
        right.left = leaf.offset;
        right.right = leaf.right;
        if leaf.right.is_valid() {
            let mut next = self.take_node(leaf.right)?;
            next.leaf_mut().left = right_offset;
            next.mark_dirty();
            self.put_node(next)?;
        }
        leaf.right = right_offset;
        leaf.dirty = true;
        self.put_node(Node::Leaf(right))?;
        Ok(Planted::Split { sep, right_offset })
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    fn remove_from(&mut self, node: &mut Node<R>, rec: &R) -> Result<bool> {
        let (pos, child_offset) = match node {
            Node::Leaf(leaf) => return Ok(leaf.remove(rec)),
            Node::Inner(inner) => {
                let pos = inner.route_for_key(&rec.key());
                (pos, inner.children[pos])
            }
        };

        let mut child = self.take_node(child_offset)?;
        let removed = match self.remove_from(&mut child, rec) {
            Ok(removed) => removed,
            Err(e) => {
                let _ = self.put_node(child);
                return Err(e);
            }
        };
        if !removed {
            self.put_node(child)?;
            return Ok(false);
        }

        let min_fill = match &child {
            Node::Leaf(_) => self.geo.min_leaf_fill,
            Node::Inner(_) => self.geo.min_inner_fill,
        };
        if child.entry_count() >= min_fill {
            self.put_node(child)?;
            return Ok(true);
        }

        match child {
            Node::Leaf(leaf) => self.rebalance_leaf(node.inner_mut(), pos, leaf)?,
            Node::Inner(inner) => self.rebalance_inner(node.inner_mut(), pos, inner)?,
        }
        Ok(true)
    }

    /// Restore the fill of an underfull leaf at child position `pos` of
    /// `parent`: borrow a record from a sibling that can spare one, else
    /// merge with a sibling, dropping one separator from the parent.
    fn rebalance_leaf(
        &mut self,
        parent: &mut InnerNode<R::Key>,
        pos: usize,
        mut child: LeafNode<R>,
    ) -> Result<()> {
        parent.dirty = true;

        let mut left = if pos > 0 {
            Some(self.take_node(parent.children[pos - 1])?)
        } else {
            None
        };
        if let Some(left_node) = left.as_mut() {
            if left_node.entry_count() > self.geo.min_leaf_fill {
                let left_leaf = left_node.leaf_mut();
                let moved = left_leaf.records.pop().expect("sibling above minimum fill");
                left_leaf.dirty = true;
                child.records.insert(0, moved);
                child.dirty = true;
                parent.keys[pos - 1] = child.records[0].key();
                let left_node = left.take().expect("left sibling present");
                self.put_node(left_node)?;
                self.put_node(Node::Leaf(child))?;
                return Ok(());
            }
        }

        if pos < parent.keys.len() {
            let mut right = self.take_node(parent.children[pos + 1])?;
            if right.entry_count() > self.geo.min_leaf_fill {
                let right_leaf = right.leaf_mut();
                let moved = right_leaf.records.remove(0);
                right_leaf.dirty = true;
                parent.keys[pos] = right_leaf.records[0].key();
                child.records.push(moved);
                child.dirty = true;
                self.put_node(right)?;
                if let Some(left_node) = left.take() {
                    self.put_node(left_node)?;
                }
                self.put_node(Node::Leaf(child))?;
                return Ok(());
            }
            if pos == 0 {
                // no left sibling: merge into the right one. The merged
                // page keeps the right sibling's offset so the parent's
                // remaining child pointer stays valid.
                let mut right_leaf = match right {
                    Node::Leaf(leaf) => leaf,
                    Node::Inner(_) => unreachable!("sibling of a leaf is a leaf"),
                };
                let old_offset = child.offset;
                let mut records = std::mem::take(&mut child.records);
                records.append(&mut right_leaf.records);
                right_leaf.records = records;
                right_leaf.left = child.left;
                right_leaf.dirty = true;
                if child.left.is_valid() {
                    let mut prev = self.take_node(child.left)?;
                    prev.leaf_mut().right = right_leaf.offset;
                    prev.mark_dirty();
                    self.put_node(prev)?;
                }
                self.disk.free(old_offset);
                parent.keys.remove(0);
                parent.children.remove(0);
                self.put_node(Node::Leaf(right_leaf))?;
                return Ok(());
            }
            self.put_node(right)?;
        }

        // merge into the left sibling
        let mut left_node = left.expect("underfull non-root leaf has a sibling");
        {
            let left_leaf = left_node.leaf_mut();
            left_leaf.records.append(&mut child.records);
            left_leaf.right = child.right;
            left_leaf.dirty = true;
        }
        if child.right.is_valid() {
            let mut next = self.take_node(child.right)?;
            next.leaf_mut().left = left_node.offset();
            next.mark_dirty();
            self.put_node(next)?;
        }
        self.disk.free(child.offset);
        parent.keys.remove(pos - 1);
        parent.children.remove(pos);
        self.put_node(left_node)?;
        Ok(())
    }

    /// Inner-page counterpart of [`rebalance_leaf`](Session::rebalance_leaf).
    /// Borrowing rotates a child through the parent separator; merging
    /// pulls the separator down between the two key lists.
    fn rebalance_inner(
        &mut self,
        parent: &mut InnerNode<R::Key>,
        pos: usize,
        mut child: InnerNode<R::Key>,
    ) -> Result<()> {
        parent.dirty = true;

        let mut left = if pos > 0 {
            Some(self.take_node(parent.children[pos - 1])?)
        } else {
            None
        };
        if let Some(left_node) = left.as_mut() {
            if left_node.entry_count() > self.geo.min_inner_fill {
                let left_inner = left_node.inner_mut();
                let up = left_inner.keys.pop().expect("sibling above minimum fill");
                let moved_child = left_inner.children.pop().expect("inner node has children");
                left_inner.dirty = true;
                let down = std::mem::replace(&mut parent.keys[pos - 1], up);
                child.keys.insert(0, down);
                child.children.insert(0, moved_child);
                child.dirty = true;
                let left_node = left.take().expect("left sibling present");
                self.put_node(left_node)?;
                self.put_node(Node::Inner(child))?;
                return Ok(());
            }
        }

        if pos < parent.keys.len() {
            let mut right = self.take_node(parent.children[pos + 1])?;
            if right.entry_count() > self.geo.min_inner_fill {
                let right_inner = right.inner_mut();
                let up = right_inner.keys.remove(0);
                let moved_child = right_inner.children.remove(0);
                right_inner.dirty = true;
                let down = std::mem::replace(&mut parent.keys[pos], up);
                child.keys.push(down);
                child.children.push(moved_child);
                child.dirty = true;
                self.put_node(right)?;
                if let Some(left_node) = left.take() {
                    self.put_node(left_node)?;
                }
                self.put_node(Node::Inner(child))?;
                return Ok(());
            }
            if pos == 0 {
                // no left sibling: merge into the right one, keeping its
                // offset, with the dropped separator between the key lists
                let mut right_inner = match right {
                    Node::Inner(inner) => inner,
                    Node::Leaf(_) => unreachable!("sibling of an inner node is an inner node"),
                };
                let old_offset = child.offset;
                let sep = parent.keys.remove(0);
                parent.children.remove(0);
                let mut keys = std::mem::take(&mut child.keys);
                keys.push(sep);
                keys.append(&mut right_inner.keys);
                right_inner.keys = keys;
                let mut children = std::mem::take(&mut child.children);
                children.append(&mut right_inner.children);
                right_inner.children = children;
                right_inner.dirty = true;
                self.disk.free(old_offset);
                self.put_node(Node::Inner(right_inner))?;
                return Ok(());
            }
            self.put_node(right)?;
        }

        // merge into the left sibling
        let mut left_node = left.expect("underfull non-root inner node has a sibling");
        let sep = parent.keys.remove(pos - 1);
        parent.children.remove(pos);
        {
            let left_inner = left_node.inner_mut();
            left_inner.keys.push(sep);
            left_inner.keys.append(&mut child.keys);
            left_inner.children.append(&mut child.children);
            left_inner.dirty = true;
        }
        self.disk.free(child.offset);
        self.put_node(left_node)?;
        Ok(())
    }

    // ========================================================================
    // Integrity checking
    // ========================================================================

    /// Verify one subtree: key bounds, fill, sortedness and uniform leaf
    /// depth. Returns the subtree's height. Nodes are cloned out of the
    /// cache, this is a debugging aid, not a fast path.
    fn check_subtree(
        &mut self,
        offset: PageOffset,
        is_root: bool,
        low: Option<R::Key>,
        high: Option<R::Key>,
    ) -> Result<usize> {
        let node = self.node_at(offset)?.clone();
        let corrupt = |msg: String| Err(Error::Corrupt(msg));

        match node {
            Node::Leaf(leaf) => {
                // fill levels depend on the workload (a bulk load packs
                // pages, a tail split leaves one half full), but a
                // non-root leaf is never empty
                if !is_root && leaf.records.is_empty() {
                    return corrupt(format!("empty leaf at {}", offset));
                }
                for pair in leaf.records.windows(2) {
                    if pair[0] >= pair[1] {
                        return corrupt(format!("leaf at {} out of order", offset));
                    }
                }
                for rec in &leaf.records {
                    let key = rec.key();
                    if low.as_ref().is_some_and(|lo| key < *lo)
                        || high.as_ref().is_some_and(|hi| key > *hi)
                    {
                        return corrupt(format!("leaf at {} violates separator bounds", offset));
                    }
                }
                Ok(0)
            }
            Node::Inner(inner) => {
                if inner.children.len() != inner.keys.len() + 1 {
                    return corrupt(format!("inner node at {} child count mismatch", offset));
                }
                if !is_root && inner.keys.is_empty() {
                    return corrupt(format!("keyless inner node at {}", offset));
                }
                if is_root && inner.keys.is_empty() {
                    return corrupt(format!("childless root at {} was not collapsed", offset));
                }
                for pair in inner.keys.windows(2) {
                    if pair[0] > pair[1] {
                        return corrupt(format!("inner node at {} keys out of order", offset));
                    }
                }
                let mut depth = None;
                for (i, child) in inner.children.iter().enumerate() {
                    let lo = if i == 0 {
                        low.clone()
                    } else {
                        Some(inner.keys[i - 1].clone())
                    };
                    let hi = if i == inner.keys.len() {
                        high.clone()
                    } else {
                        Some(inner.keys[i].clone())
                    };
                    let d = self.check_subtree(*child, false, lo, hi)?;
                    if *depth.get_or_insert(d) != d {
                        return corrupt(format!("uneven leaf depth under {}", offset));
                    }
                }
                Ok(depth.expect("inner node has children") + 1)
            }
        }
    }

    /// Walk the leaf chain left to right, checking back links, global
    /// record order and the total record count.
    fn check_leaf_chain(&mut self, expected_count: u64) -> Result<()> {
        let mut offset = self.locate_leaf(None)?;
        let mut prev = PageOffset::NONE;
        let mut count = 0u64;
        let mut last: Option<R> = None;

        loop {
            let leaf = self.node_at(offset)?.leaf().clone();
            if leaf.left != prev {
                return Err(Error::Corrupt(format!(
                    "leaf at {} back link {} does not match {}",
                    offset, leaf.left, prev
                )));
            }
            count += leaf.records.len() as u64;
            for rec in &leaf.records {
                if last.as_ref().is_some_and(|p| p >= rec) {
                    return Err(Error::Corrupt(format!(
                        "leaf chain out of order at {}",
                        offset
                    )));
                }
                last = Some(rec.clone());
            }
            if !leaf.right.is_valid() {
                break;
            }
            prev = offset;
            offset = leaf.right;
        }

        if count != expected_count {
            return Err(Error::Corrupt(format!(
                "leaf chain holds {} records, tree claims {}",
                count, expected_count
            )));
        }
        Ok(())
    }
}

/// An on-disk B+tree index over fixed-size records.
///
/// `R` is the record type stored in leaves; its [`Record::Key`] type is
/// what inner pages route by. Capacities follow from the page size and the
/// serialized sizes, so a 4KB page holds a few hundred small records.
///
/// The tree is single-threaded. Lookups take `&mut self` because they
/// fault pages through the cache; iterators borrow the tree mutably for
/// their whole lifetime, so the structure cannot change underneath them.
///
/// # Example
/// ```no_run
/// use bptree::BPTree;
/// # use bptree::{Key, Record};
/// # #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
/// # struct Pair(i32);
/// # impl Record for Pair {
/// #     type Key = i32;
/// #     const SIZE: usize = 4;
/// #     fn key(&self) -> i32 { self.0 }
/// #     fn write_to(&self, buf: &mut [u8]) { buf.copy_from_slice(&self.0.to_le_bytes()); }
/// #     fn read_from(buf: &[u8]) -> Self { Pair(i32::from_le_bytes(buf.try_into().unwrap())) }
/// # }
///
/// let mut tree: BPTree<Pair> = BPTree::new("pairs.idx");
/// tree.open_new()?;
/// tree.add(Pair(42))?;
/// assert_eq!(tree.get(&42)?, Some(Pair(42)));
/// tree.close()?;
/// # Ok::<(), bptree::Error>(())
/// ```
pub struct BPTree<R: Record> {
    pub(crate) path: PathBuf,
    pub(crate) page_size: usize,
    pub(crate) cache_capacity: usize,
    /// Root page offset of the last closed state, `NONE` before the first
    /// open. While open, the live value is `session.root`.
    pub(crate) root_offset: PageOffset,
    pub(crate) entry_count: u64,
    /// Tree height, `-1` when not known. Lazily recomputed on demand.
    pub(crate) height: i32,
    /// Cached extremes, `None` when not known.
    pub(crate) min_key: Option<R::Key>,
    pub(crate) max_key: Option<R::Key>,
    /// Free-page pool of the last closed state.
    pub(crate) free_offsets: Vec<i64>,
    pub(crate) session: Option<Session<R>>,
}

impl<R: Record> BPTree<R> {
    /// Create a closed tree over the index file at `path` with default
    /// page size and cache capacity. No I/O happens until an `open_*`
    /// call.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            root_offset: PageOffset::NONE,
            entry_count: 0,
            height: -1,
            min_key: None,
            max_key: None,
            free_offsets: Vec::new(),
            session: None,
        }
    }

    /// Reconstruct a closed tree from a snapshot written by
    /// [`store_snapshot`](BPTree::store_snapshot). The index file itself
    /// is not touched until the tree is opened.
    pub fn from_snapshot<P: Into<PathBuf>, Q: AsRef<Path>>(
        index_path: P,
        snapshot_path: Q,
    ) -> Result<Self> {
        let snap = TreeSnapshot::read_from_file(snapshot_path)?;
        let mut tree = Self::new(index_path);
        tree.set_page_size(snap.page_size as usize)?;
        tree.root_offset = PageOffset::new(snap.root_offset);
        tree.entry_count = snap.entry_count;
        tree.free_offsets = snap.free_offsets;
        Ok(tree)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Set the page size. Only allowed while closed; must match the file
    /// the tree will be opened over.
    pub fn set_page_size(&mut self, page_size: usize) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.page_size = page_size;
        Ok(())
    }

    /// Set how many nodes the page cache may hold. Only allowed while
    /// closed.
    pub fn set_cache_capacity(&mut self, capacity: usize) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        if capacity == 0 {
            return Err(Error::Config("cache capacity must be at least 1"));
        }
        self.cache_capacity = capacity;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Records one leaf page can hold with the current page size.
    pub fn leaf_capacity(&self) -> usize {
        self.geometry().leaf_capacity
    }

    /// Separator keys one inner page can hold with the current page size.
    pub fn inner_capacity(&self) -> usize {
        self.geometry().inner_capacity
    }

    /// Pages the index file currently spans, counting freed pages that
    /// await reuse. Zero while the tree is closed.
    pub fn page_count(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.disk.page_count())
    }

    pub(crate) fn geometry(&self) -> Geometry {
        Geometry::for_record::<R>(self.page_size)
    }

    pub(crate) fn validate_geometry(&self) -> Result<()> {
        if R::SIZE == 0 || <R::Key as Key>::SIZE == 0 {
            return Err(Error::Config("record and key sizes must be nonzero"));
        }
        let geo = self.geometry();
        if geo.leaf_capacity < 2 || geo.inner_capacity < 2 {
            return Err(Error::Config(
                "page size too small to hold two records per node",
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a fresh, empty index file, truncating anything at the
    /// tree's path, and open it for writing.
    pub fn open_new(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.validate_geometry()?;

        let disk = DiskManager::create(&self.path, self.page_size)?;
        let mut session = Session::new(disk, self.cache_capacity, false, self.geometry());
        let root_offset = session.disk.allocate();
        session.root = Some(Node::Leaf(LeafNode::new(root_offset)));
        self.session = Some(session);
        self.root_offset = root_offset;
        self.entry_count = 0;
        self.height = 0;
        self.min_key = None;
        self.max_key = None;
        self.free_offsets.clear();
        Ok(())
    }

    /// Open the existing index file for reading and writing. The tree
    /// must know its root offset, either from a previous session in this
    /// process or from [`from_snapshot`](BPTree::from_snapshot).
    pub fn open(&mut self) -> Result<()> {
        self.open_existing(false)
    }

    /// Open the existing index file for reading only. Mutating calls fail
    /// with [`Error::ReadOnly`].
    pub fn open_read_only(&mut self) -> Result<()> {
        self.open_existing(true)
    }

    fn open_existing(&mut self, read_only: bool) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.validate_geometry()?;
        if !self.root_offset.is_valid() {
            return Err(Error::Config(
                "no root offset; create the index with open_new or load a snapshot",
            ));
        }

        let mut disk = if read_only {
            DiskManager::open_read_only(&self.path, self.page_size)?
        } else {
            DiskManager::open(&self.path, self.page_size)?
        };
        disk.restore_free_offsets(self.free_offsets.drain(..));

        let mut session = Session::new(disk, self.cache_capacity, read_only, self.geometry());
        let root = session.load_node(self.root_offset)?;
        session.root = Some(root);
        self.session = Some(session);
        self.height = -1;
        self.min_key = None;
        self.max_key = None;
        Ok(())
    }

    /// Write every dirty page back, sync the file and release the
    /// session. The tree keeps its metadata and can be reopened with
    /// [`open`](BPTree::open).
    pub fn close(&mut self) -> Result<()> {
        let mut session = self.session.take().ok_or(Error::Closed)?;

        for node in session.cache.drain() {
            if node.is_dirty() {
                session.write_node(&node)?;
            }
        }
        let root = session.root.take().expect("tree root missing");
        if root.is_dirty() {
            session.write_node(&root)?;
        }
        session.disk.sync()?;

        self.root_offset = root.offset();
        self.free_offsets = session.disk.free_offsets();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.read_only)
    }

    /// Write the tree's metadata to `path` so it can be reconstructed
    /// later with [`from_snapshot`](BPTree::from_snapshot). Meaningful
    /// after [`close`](BPTree::close); a snapshot of an open tree
    /// describes pages that may not have been flushed yet.
    pub fn store_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let (root_offset, free_offsets) = match &self.session {
            Some(session) => (session.root_offset().0, session.disk.free_offsets()),
            None => (self.root_offset.0, self.free_offsets.clone()),
        };
        TreeSnapshot {
            page_size: self.page_size as u32,
            root_offset,
            entry_count: self.entry_count,
            free_offsets,
        }
        .write_to_file(path)
    }

    pub(crate) fn session_mut(&mut self) -> Result<&mut Session<R>> {
        self.session.as_mut().ok_or(Error::Closed)
    }

    fn writable(&mut self) -> Result<&mut Session<R>> {
        let session = self.session.as_mut().ok_or(Error::Closed)?;
        if session.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(session)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of records in the tree. Available while closed as well.
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Height of the tree: 0 when the root is a leaf. Walks the leftmost
    /// spine on the first call after opening, then serves the cached
    /// value.
    pub fn height(&mut self) -> Result<u32> {
        if self.height < 0 {
            let h = {
                let session = self.session_mut()?;
                let mut h = 0u32;
                let mut offset = session.root_offset();
                loop {
                    let next = match session.node_at(offset)? {
                        Node::Leaf(_) => break,
                        Node::Inner(inner) => inner.children[0],
                    };
                    offset = next;
                    h += 1;
                }
                h
            };
            self.height = h as i32;
        }
        Ok(self.height as u32)
    }

    /// Smallest key in the tree, or `None` when empty. Lazily walks to
    /// the leftmost leaf when the cached value was invalidated.
    pub fn min(&mut self) -> Result<Option<R::Key>> {
        if self.entry_count == 0 {
            return Ok(None);
        }
        if self.min_key.is_none() {
            let key = {
                let session = self.session_mut()?;
                let offset = session.locate_leaf(None)?;
                session.node_at(offset)?.leaf().records.first().map(|r| r.key())
            };
            self.min_key = key;
        }
        Ok(self.min_key.clone())
    }

    /// Largest key in the tree, or `None` when empty.
    pub fn max(&mut self) -> Result<Option<R::Key>> {
        if self.entry_count == 0 {
            return Ok(None);
        }
        if self.max_key.is_none() {
            let key = {
                let session = self.session_mut()?;
                let offset = session.locate_rightmost_leaf()?;
                session.node_at(offset)?.leaf().records.last().map(|r| r.key())
            };
            self.max_key = key;
        }
        Ok(self.max_key.clone())
    }

    /// Look up one record with the given key. With duplicates present it
    /// is unspecified which one is returned; use
    /// [`records_for_key`](BPTree::records_for_key) for all of them.
    pub fn get(&mut self, key: &R::Key) -> Result<Option<R>> {
        let session = self.session_mut()?;
        let offset = session.locate_leaf(Some(key))?;
        let leaf = session.node_at(offset)?.leaf();
        Ok(leaf.search_key(key).ok().map(|pos| leaf.records[pos].clone()))
    }

    /// Whether this exact record is present, compared by full record
    /// order.
    pub fn contains(&mut self, rec: &R) -> Result<bool> {
        let key = rec.key();
        let session = self.session_mut()?;
        let (mut offset, mut pos) = session.locate_key_run(&key)?;
        loop {
            let (found, next, exhausted) = {
                let leaf = session.node_at(offset)?.leaf();
                let mut i = pos;
                let mut found = false;
                while i < leaf.records.len() && leaf.records[i].key() == key {
                    if leaf.records[i] == *rec {
                        found = true;
                        break;
                    }
                    i += 1;
                }
                (found, leaf.right, i == leaf.records.len())
            };
            if found {
                return Ok(true);
            }
            if !exhausted || !next.is_valid() {
                return Ok(false);
            }
            offset = next;
            pos = 0;
        }
    }

    /// All records with the given key, in ascending record order. Starts
    /// at the first occurrence and follows the leaf chain while the run
    /// continues.
    pub fn records_for_key(&mut self, key: &R::Key) -> Result<Vec<R>> {
        let session = self.session_mut()?;
        let mut out = Vec::new();
        let (mut offset, mut pos) = session.locate_key_run(key)?;

        loop {
            let (next, exhausted) = {
                let leaf = session.node_at(offset)?.leaf();
                let mut i = pos;
                while i < leaf.records.len() && leaf.records[i].key() == *key {
                    out.push(leaf.records[i].clone());
                    i += 1;
                }
                (leaf.right, i == leaf.records.len())
            };
            // a run ending exactly at a leaf boundary may continue next door
            if !exhausted || !next.is_valid() {
                break;
            }
            offset = next;
            pos = 0;
        }
        Ok(out)
    }

    /// All records with keys in `[low, high]`, both ends inclusive, in
    /// ascending record order.
    pub fn range(&mut self, low: &R::Key, high: &R::Key) -> Result<Vec<R>> {
        let mut out = Vec::new();
        if low > high {
            return Ok(out);
        }
        let session = self.session_mut()?;
        let (mut offset, mut pos) = session.locate_key_run(low)?;

        loop {
            let next = {
                let leaf = session.node_at(offset)?.leaf();
                for rec in &leaf.records[pos..] {
                    if rec.key() > *high {
                        return Ok(out);
                    }
                    out.push(rec.clone());
                }
                leaf.right
            };
            if !next.is_valid() {
                break;
            }
            offset = next;
            pos = 0;
        }
        Ok(out)
    }

    /// Cache and I/O counters for the current session.
    pub fn stats(&self) -> Result<TreeStats> {
        Ok(self.session.as_ref().ok_or(Error::Closed)?.stats)
    }

    pub fn reset_stats(&mut self) -> Result<()> {
        self.session_mut()?.stats.reset();
        Ok(())
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Insert a record. Returns `false` without changing anything if an
    /// identical record is already present; records that merely share the
    /// key are fine.
    pub fn add(&mut self, rec: R) -> Result<bool> {
        let key = rec.key();
        let (inserted, grew) = {
            let session = self.writable()?;
            let mut root = session.root.take().expect("tree root missing");
            let planted = match session.insert_into(&mut root, rec) {
                Ok(planted) => planted,
                Err(e) => {
                    session.root = Some(root);
                    return Err(e);
                }
            };
            match planted {
                Planted::Duplicate => {
                    session.root = Some(root);
                    (false, false)
                }
                Planted::Done => {
                    session.root = Some(root);
                    (true, false)
                }
                Planted::Split { sep, right_offset } => {
                    let old_offset = root.offset();
                    let new_offset = session.disk.allocate();
                    session.root = Some(Node::Inner(InnerNode::new_root(
                        new_offset, old_offset, sep, right_offset,
                    )));
                    session.put_node(root)?;
                    (true, true)
                }
            }
        };

        if inserted {
            self.entry_count += 1;
            if let Some(min) = &self.min_key {
                if key < *min {
                    self.min_key = Some(key.clone());
                }
            }
            if let Some(max) = &self.max_key {
                if key > *max {
                    self.max_key = Some(key);
                }
            }
        }
        if grew && self.height >= 0 {
            self.height += 1;
        }
        Ok(inserted)
    }

    /// Remove the exact record, compared by full record order. Returns
    /// whether it was present.
    pub fn remove(&mut self, rec: &R) -> Result<bool> {
        let removed_key = rec.key();
        let (removed, shrank) = {
            let session = self.writable()?;
            let mut root = session.root.take().expect("tree root missing");
            let removed = match session.remove_from(&mut root, rec) {
                Ok(removed) => removed,
                Err(e) => {
                    session.root = Some(root);
                    return Err(e);
                }
            };

            // a merge may leave the root with a single child; collapse it
            let mut shrank = false;
            if let Node::Inner(inner) = &root {
                if inner.keys.is_empty() {
                    let child_offset = inner.children[0];
                    match session.take_node(child_offset) {
                        Ok(child) => {
                            session.disk.free(root.offset());
                            root = child;
                            shrank = true;
                        }
                        Err(e) => {
                            session.root = Some(root);
                            return Err(e);
                        }
                    }
                }
            }
            session.root = Some(root);
            (removed, shrank)
        };

        if removed {
            self.entry_count -= 1;
            // the removed record may have carried a cached extreme;
            // recompute lazily on the next min()/max() call
            if self.min_key.as_ref() == Some(&removed_key) {
                self.min_key = None;
            }
            if self.max_key.as_ref() == Some(&removed_key) {
                self.max_key = None;
            }
        }
        if shrank && self.height > 0 {
            self.height -= 1;
        }
        Ok(removed)
    }

    /// Remove every record with the given key. Returns whether any were
    /// present.
    ///
    /// Removal is best-effort sequential: an I/O error part way through
    /// leaves the records removed so far gone.
    pub fn remove_key(&mut self, key: &R::Key) -> Result<bool> {
        let matches = self.records_for_key(key)?;
        if matches.is_empty() {
            return Ok(false);
        }
        for rec in &matches {
            self.remove(rec)?;
        }
        Ok(true)
    }

    // ========================================================================
    // Integrity
    // ========================================================================

    /// Exhaustively verify structural invariants: separator bounds, node
    /// fill, sortedness, uniform leaf depth, the sibling chain and the
    /// record count. Reads every page; intended for tests and debugging.
    pub fn check_integrity(&mut self) -> Result<()> {
        let expected_count = self.entry_count;
        let session = self.session_mut()?;
        let root_offset = session.root_offset();
        session.check_subtree(root_offset, true, None, None)?;
        session.check_leaf_chain(expected_count)
    }
}
