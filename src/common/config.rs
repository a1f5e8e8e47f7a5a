//! Configuration constants for the index.

/// Default size of a page in bytes (4KB).
///
/// This value is chosen to match:
/// - OS page size on most systems (4096 bytes)
/// - Common database page sizes (PostgreSQL uses 8KB, but 4KB is also standard)
///
/// The page size is configurable per tree before it is opened; this is only
/// the default. Every node of the tree occupies exactly one page.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of nodes held in the in-memory page cache.
///
/// The root node is pinned outside the cache, so the worst-case resident
/// memory is `(DEFAULT_CACHE_CAPACITY + 1) * page_size` plus bookkeeping.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Serialized size of a leaf page header in bytes.
///
/// Layout: 1-byte node tag, two 8-byte sibling offsets, 4-byte record count.
pub const LEAF_HEADER_SIZE: usize = 21;

/// Serialized size of an inner page header in bytes.
///
/// Layout: 1-byte node tag, 4-byte key count, plus the one child offset that
/// is not paired with a key (an inner page stores one more child than keys).
pub const INNER_HEADER_SIZE: usize = 13;
