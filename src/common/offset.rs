//! Page offset type.

use std::fmt;

/// Byte offset of a page within the index file.
///
/// Offsets are always multiples of the page size. A negative value is the
/// sentinel for "no page", used for missing siblings and an unset root.
///
/// # Example
/// ```
/// use bptree::PageOffset;
///
/// let off = PageOffset::new(4096);
/// assert!(off.is_valid());
/// assert_eq!(off.0, 4096);
/// assert!(!PageOffset::NONE.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageOffset(pub i64);

impl PageOffset {
    /// Sentinel for "no page".
    pub const NONE: PageOffset = PageOffset(-1);

    /// Create a new PageOffset.
    #[inline]
    pub fn new(offset: i64) -> Self {
        PageOffset(offset)
    }

    /// Check if this offset refers to a page (is not the sentinel).
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PageOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Offset({})", self.0)
        } else {
            write!(f, "Offset(NONE)")
        }
    }
}
