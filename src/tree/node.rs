//! Node enum over the two page kinds.

use crate::common::{Error, PageOffset, Result};
use crate::tree::inner::InnerNode;
use crate::tree::leaf::LeafNode;
use crate::tree::record::Record;

/// First byte of a serialized inner page.
pub(crate) const TAG_INNER: u8 = 1;
/// First byte of a serialized leaf page.
pub(crate) const TAG_LEAF: u8 = 2;

/// A tree node held in memory, either kind.
///
/// Every node corresponds to exactly one page of the index file. The kind
/// is recovered from the tag byte when the page is read back, so descent
/// code can match on the enum instead of tracking tree height.
#[derive(Debug, Clone)]
pub(crate) enum Node<R: Record> {
    Leaf(LeafNode<R>),
    Inner(InnerNode<R::Key>),
}

impl<R: Record> Node<R> {
    /// File offset of the underlying page.
    pub(crate) fn offset(&self) -> PageOffset {
        match self {
            Node::Leaf(leaf) => leaf.offset,
            Node::Inner(inner) => inner.offset,
        }
    }

    /// Number of records (leaf) or separator keys (inner).
    pub(crate) fn entry_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.records.len(),
            Node::Inner(inner) => inner.keys.len(),
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.dirty,
            Node::Inner(inner) => inner.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        match self {
            Node::Leaf(leaf) => leaf.dirty = true,
            Node::Inner(inner) => inner.dirty = true,
        }
    }

    /// View as a leaf. Panics on an inner node; callers rely on structural
    /// invariants (all leaves at the same depth) to know the kind.
    pub(crate) fn leaf(&self) -> &LeafNode<R> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Inner(inner) => panic!("expected leaf at {}", inner.offset),
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> &mut LeafNode<R> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Inner(inner) => panic!("expected leaf at {}", inner.offset),
        }
    }

    /// View as an inner node. Panics on a leaf.
    pub(crate) fn inner_mut(&mut self) -> &mut InnerNode<R::Key> {
        match self {
            Node::Inner(inner) => inner,
            Node::Leaf(leaf) => panic!("expected inner node at {}", leaf.offset),
        }
    }

    /// Serialize into a page-sized buffer.
    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        match self {
            Node::Leaf(leaf) => leaf.write_to(buf),
            Node::Inner(inner) => inner.write_to(buf),
        }
    }

    /// Deserialize a node at `offset` from a page-sized buffer, dispatching
    /// on the tag byte.
    pub(crate) fn read_from(offset: PageOffset, buf: &[u8]) -> Result<Self> {
        match buf[0] {
            TAG_LEAF => Ok(Node::Leaf(LeafNode::read_from(offset, buf)?)),
            TAG_INNER => Ok(Node::Inner(InnerNode::read_from(offset, buf)?)),
            tag => Err(Error::Corrupt(format!(
                "page at {} has unknown node tag {}",
                offset, tag
            ))),
        }
    }
}
