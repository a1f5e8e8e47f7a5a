//! Disk Manager - low-level file I/O for index pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing page-sized blocks
//! - Allocating page offsets, reusing freed ones first
//! - Managing the index file

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Error, PageOffset, Result};

/// Manages disk I/O for a single index file.
///
/// # File Layout
/// The index is stored as a single file with pages laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page    │ Page    │ Page    │  ...    │ Page    │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0       P        2P      ...     N×P       (P = page size)
/// ```
///
/// Pages are addressed directly by byte offset rather than by ordinal, so a
/// node can store the file position of its children and siblings verbatim.
///
/// # Allocation
/// [`allocate`](DiskManager::allocate) hands out offsets of freed pages in
/// FIFO order before extending the file. Freed pages are not shrunk away;
/// the file only ever grows.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The tree owning it serializes all
/// access.
///
/// # Durability
/// Writes are buffered by the OS; [`sync`](DiskManager::sync) flushes them.
/// The tree calls it once when closing, there is no per-write fsync.
pub struct DiskManager {
    file: File,
    page_size: usize,
    /// File offset one past the last allocated page.
    end_offset: i64,
    /// Offsets of freed pages, reused in FIFO order.
    free_offsets: VecDeque<i64>,
    read_only: bool,
}

impl DiskManager {
    /// Create a new index file, truncating any existing file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            page_size,
            end_offset: 0,
            free_offsets: VecDeque::new(),
            read_only: false,
        })
    }

    /// Open an existing index file for reading and writing.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Self::from_file(file, page_size, false)
    }

    /// Open an existing index file for reading only.
    ///
    /// Any call to [`write_block`](DiskManager::write_block) will fail with
    /// [`Error::ReadOnly`].
    pub fn open_read_only<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(&path)?;
        Self::from_file(file, page_size, true)
    }

    fn from_file(file: File, page_size: usize, read_only: bool) -> Result<Self> {
        let file_size = file.metadata()?.len() as i64;

        Ok(Self {
            file,
            page_size,
            end_offset: file_size,
            free_offsets: VecDeque::new(),
            read_only,
        })
    }

    /// Read one page-sized block at `offset` into `buf`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the offset lies beyond the end of
    /// the allocated file region.
    pub fn read_block(&mut self, offset: PageOffset, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        debug_assert_eq!(offset.0 % self.page_size as i64, 0);

        if !offset.is_valid() || offset.0 >= self.end_offset {
            return Err(Error::PageNotFound(offset.0));
        }

        self.file.seek(SeekFrom::Start(offset.0 as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write one page-sized block from `buf` at `offset`.
    ///
    /// Writing at the current end of file extends it; the offset must have
    /// been handed out by [`allocate`](DiskManager::allocate).
    pub fn write_block(&mut self, offset: PageOffset, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        debug_assert_eq!(offset.0 % self.page_size as i64, 0);

        if self.read_only {
            return Err(Error::ReadOnly);
        }
        if !offset.is_valid() || offset.0 >= self.end_offset {
            return Err(Error::PageNotFound(offset.0));
        }

        self.file.seek(SeekFrom::Start(offset.0 as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Hand out the offset for a new page.
    ///
    /// Freed offsets are reused in FIFO order; only when none are queued is
    /// the file's logical end advanced by one page. The page contents on
    /// disk are whatever was there before, callers always write the full
    /// page before reading it back.
    pub fn allocate(&mut self) -> PageOffset {
        if let Some(offset) = self.free_offsets.pop_front() {
            return PageOffset::new(offset);
        }
        let offset = self.end_offset;
        self.end_offset += self.page_size as i64;
        PageOffset::new(offset)
    }

    /// Return a page's offset to the free pool for later reuse.
    pub fn free(&mut self, offset: PageOffset) {
        debug_assert!(offset.is_valid());
        self.free_offsets.push_back(offset.0);
    }

    /// Seed the free pool, e.g. from a snapshot taken at the last close.
    ///
    /// A page can be allocated and freed without ever being written, so a
    /// restored offset may lie past the physical end of the file; the
    /// logical end is extended to cover it.
    pub fn restore_free_offsets<I: IntoIterator<Item = i64>>(&mut self, offsets: I) {
        self.free_offsets.extend(offsets);
        for &offset in &self.free_offsets {
            self.end_offset = self.end_offset.max(offset + self.page_size as i64);
        }
    }

    /// Current free pool contents, in reuse order.
    pub fn free_offsets(&self) -> Vec<i64> {
        self.free_offsets.iter().copied().collect()
    }

    /// Flush all buffered writes to the underlying file.
    pub fn sync(&mut self) -> Result<()> {
        if !self.read_only {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Size of one page in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages allocated in the file, free pool included.
    pub fn page_count(&self) -> u64 {
        (self.end_offset / self.page_size as i64) as u64
    }
}
