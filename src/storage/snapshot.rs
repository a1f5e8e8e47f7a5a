//! Serialized tree metadata.
//!
//! An index file alone is not enough to reopen a tree: the root offset, the
//! entry count and the free-page pool live only in memory. A [`TreeSnapshot`]
//! captures them in a small side file so the tree can be reopened later.

use std::path::Path;

use crate::common::{Error, Result};

/// Magic bytes at the start of a snapshot file ("BPTS").
const MAGIC: [u8; 4] = *b"BPTS";

/// Fixed-size prefix: magic, page size, root offset, entry count, free count.
const FIXED_HEADER_SIZE: usize = 4 + 4 + 8 + 8 + 4;

/// Tree metadata persisted between sessions.
///
/// # Wire Format
/// All integers little-endian:
/// ```text
/// ┌───────┬───────────┬─────────────┬─────────────┬────────────┬──────────────┬───────┐
/// │ magic │ page_size │ root_offset │ entry_count │ free_count │ free_offsets │ crc32 │
/// │ 4B    │ u32       │ i64         │ u64         │ u32        │ i64 × count  │ u32   │
/// └───────┴───────────┴─────────────┴─────────────┴────────────┴──────────────┴───────┘
/// ```
/// The checksum covers every preceding byte, magic included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
    /// Page size the index file was written with.
    pub page_size: u32,
    /// Offset of the root page, negative if the tree was never opened.
    pub root_offset: i64,
    /// Number of records in the tree.
    pub entry_count: u64,
    /// Free-page pool, in reuse order.
    pub free_offsets: Vec<i64>,
}

impl TreeSnapshot {
    /// Serialize into snapshot wire format, checksum included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FIXED_HEADER_SIZE + self.free_offsets.len() * 8 + 4);
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&self.page_size.to_le_bytes());
        buf.extend_from_slice(&self.root_offset.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        buf.extend_from_slice(&(self.free_offsets.len() as u32).to_le_bytes());
        for off in &self.free_offsets {
            buf.extend_from_slice(&off.to_le_bytes());
        }

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        let checksum = hasher.finalize();
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Deserialize from snapshot wire format, verifying the checksum.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE + 4 {
            return Err(Error::Corrupt("snapshot file truncated".into()));
        }
        if data[0..4] != MAGIC {
            return Err(Error::Corrupt("snapshot magic mismatch".into()));
        }

        let payload = &data[..data.len() - 4];
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(payload);
        let computed = hasher.finalize();
        let stored = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());
        if computed != stored {
            return Err(Error::Corrupt(format!(
                "snapshot checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let page_size = u32::from_le_bytes(data[4..8].try_into().unwrap());
        let root_offset = i64::from_le_bytes(data[8..16].try_into().unwrap());
        let entry_count = u64::from_le_bytes(data[16..24].try_into().unwrap());
        let free_count = u32::from_le_bytes(data[24..28].try_into().unwrap()) as usize;

        if payload.len() != FIXED_HEADER_SIZE + free_count * 8 {
            return Err(Error::Corrupt("snapshot free-offset count mismatch".into()));
        }

        let mut free_offsets = Vec::with_capacity(free_count);
        for i in 0..free_count {
            let start = FIXED_HEADER_SIZE + i * 8;
            free_offsets.push(i64::from_le_bytes(data[start..start + 8].try_into().unwrap()));
        }

        Ok(Self {
            page_size,
            root_offset,
            entry_count,
            free_offsets,
        })
    }

    /// Write the snapshot to a file at `path`.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Read a snapshot back from a file written by
    /// [`write_to_file`](TreeSnapshot::write_to_file).
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(&data)
    }
}
