//! Cache and I/O statistics.

use std::fmt;

/// Counters collected while a tree is open.
///
/// The engine is single-threaded, so these are plain integers updated
/// inline. A fresh set starts at zero each time the tree is opened;
/// [`BPTree::reset_stats`](crate::BPTree::reset_stats) zeroes them mid-run,
/// e.g. to measure one workload phase.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Node lookups satisfied by the page cache.
    pub cache_hits: u64,
    /// Node lookups that had to read from disk.
    pub cache_misses: u64,
    /// Nodes pushed out of the cache by capacity pressure.
    pub evictions: u64,
    /// Pages read from the index file.
    pub pages_read: u64,
    /// Pages written to the index file.
    pub pages_written: u64,
}

impl TreeStats {
    /// Cache hit rate in `[0.0, 1.0]`, or 0.0 before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / total as f64
    }

    /// Total disk operations performed.
    pub fn io_ops(&self) -> u64 {
        self.pages_read + self.pages_written
    }

    pub fn reset(&mut self) {
        *self = TreeStats::default();
    }
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TreeStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, evictions: {}, reads: {}, writes: {} }}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate() * 100.0,
            self.evictions,
            self.pages_read,
            self.pages_written,
        )
    }
}
