//! Bottom-up bulk loading.
//!
//! Building a tree by repeated [`add`](crate::BPTree::add) costs a descent
//! per record. When the input is already sorted the whole tree can be laid
//! out in one pass instead: pages are allocated in preorder, each leaf is
//! packed full from the record stream, and every parent receives the
//! minimum key of each child subtree as it completes.
//!
//! # Sibling links without backtracking
//! A leaf's neighbors are not known while it is being written, but preorder
//! allocation makes their offsets predictable: the next leaf under the same
//! parent is exactly one page away, and across a subtree boundary the gap
//! equals the number of inner pages allocated in between, which is the
//! height of the ancestor the boundary passes through. Each recursion hands
//! its children these gap counts (the edge children inherit the parent's
//! own, interior children use the parent's height), and the leaf turns them
//! into offsets with plain arithmetic. `-1` marks the outer edges of the
//! tree, where no sibling exists.

use crate::common::{Error, PageOffset, Result};
use crate::storage::DiskManager;
use crate::tree::inner::InnerNode;
use crate::tree::leaf::LeafNode;
use crate::tree::node::Node;
use crate::tree::record::Record;
use crate::tree::bptree::{BPTree, Session};

impl<R: Record> Session<R> {
    /// Fill `node` with the next `size` records of the stream, recursing
    /// through `height` levels. `subtree_sizes[h]` is the record count of
    /// a full subtree of height `h`. Returns the minimum key of the
    /// subtree, which becomes a separator one level up.
    fn bulk_fill(
        &mut self,
        node: &mut Node<R>,
        records: &mut dyn Iterator<Item = R>,
        size: usize,
        height: u32,
        subtree_sizes: &[usize],
        left_gap: i64,
        right_gap: i64,
    ) -> Result<R::Key> {
        let leaf = match node {
            Node::Leaf(leaf) => leaf,
            Node::Inner(_) => {
                let child_height = height - 1;
                let child_capacity = subtree_sizes[child_height as usize];
                // smallest record count a subtree of the child height can
                // carry without producing a keyless inner node on its spine
                let child_floor = if child_height == 0 {
                    1
                } else {
                    subtree_sizes[child_height as usize - 1] + 1
                };
                let mut remaining = size;
                let mut first = true;
                let mut first_key = None;

                loop {
                    let child_offset = self.disk.allocate();
                    let mut child = if child_height == 0 {
                        Node::Leaf(LeafNode::new(child_offset))
                    } else {
                        Node::Inner(InnerNode::new(child_offset))
                    };
                    let is_last = remaining <= child_capacity;
                    let take = if is_last {
                        remaining
                    } else if remaining - child_capacity < child_floor {
                        // a full child here would strand a tail too small
                        // to stand as a subtree of its own; spread the
                        // leftover across the final two children instead
                        remaining - remaining / 2
                    } else {
                        child_capacity
                    };
                    let child_left = if first { left_gap } else { height as i64 };
                    let child_right = if is_last { right_gap } else { height as i64 };
                    let key = self.bulk_fill(
                        &mut child,
                        records,
                        take,
                        child_height,
                        subtree_sizes,
                        child_left,
                        child_right,
                    )?;

                    {
                        let inner = node.inner_mut();
                        if first {
                            first_key = Some(key);
                        } else {
                            inner.keys.push(key);
                        }
                        inner.children.push(child_offset);
                    }
                    self.put_node(child)?;

                    if is_last {
                        break;
                    }
                    remaining -= take;
                    first = false;
                }
                node.mark_dirty();
                return Ok(first_key.expect("inner node received at least one child"));
            }
        };

        debug_assert!(size >= 1 && size <= self.geo.leaf_capacity);
        leaf.records.reserve(size);
        for _ in 0..size {
            let rec = records
                .next()
                .ok_or(Error::Config("bulk load iterator ran out before count"))?;
            debug_assert!(
                leaf.records.last().map_or(true, |prev| *prev < rec),
                "bulk load input not in ascending record order"
            );
            leaf.records.push(rec);
        }

        let page = self.geo.page_size as i64;
        leaf.left = if left_gap < 0 {
            PageOffset::NONE
        } else {
            PageOffset::new(leaf.offset.0 - left_gap * page)
        };
        leaf.right = if right_gap < 0 {
            PageOffset::NONE
        } else {
            PageOffset::new(leaf.offset.0 + right_gap * page)
        };
        leaf.dirty = true;
        Ok(leaf.records[0].key())
    }
}

impl<R: Record> BPTree<R> {
    /// Create a fresh index file and fill it from `records` in a single
    /// bottom-up pass, then leave the tree open for writing.
    ///
    /// `records` must yield exactly `count` records in ascending full
    /// record order; the stream is consumed lazily, so the input never
    /// needs to fit in memory. The resulting tree packs leaves to
    /// capacity; only the tail of each level runs sparse, with the
    /// leftover spread across the final two subtrees when it is too
    /// small to stand alone.
    pub fn open_and_bulk_load<I>(&mut self, records: I, count: usize) -> Result<()>
    where
        I: IntoIterator<Item = R>,
    {
        if self.session.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.validate_geometry()?;
        let geo = self.geometry();

        // smallest height whose full subtree holds `count` records
        let mut subtree_sizes = vec![geo.leaf_capacity];
        let mut height = 0u32;
        while count > *subtree_sizes.last().expect("ladder is nonempty") {
            subtree_sizes.push(subtree_sizes.last().expect("ladder is nonempty") * (geo.inner_capacity + 1));
            height += 1;
        }

        let disk = DiskManager::create(&self.path, self.page_size)?;
        let mut session = Session::new(disk, self.cache_capacity, false, geo);
        let root_offset = session.disk.allocate();
        let mut root = if height == 0 {
            Node::Leaf(LeafNode::new(root_offset))
        } else {
            Node::Inner(InnerNode::new(root_offset))
        };

        let mut records = records.into_iter();
        let min_key = if count > 0 {
            Some(session.bulk_fill(&mut root, &mut records, count, height, &subtree_sizes, -1, -1)?)
        } else {
            None
        };

        session.root = Some(root);
        self.session = Some(session);
        self.root_offset = root_offset;
        self.entry_count = count as u64;
        self.height = height as i32;
        self.min_key = min_key;
        self.max_key = None;
        self.free_offsets.clear();
        Ok(())
    }
}
