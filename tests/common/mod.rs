//! Record types shared by the integration tests.
#![allow(dead_code)]

use bptree::Record;

/// 8-byte record with an integer key and a tag that distinguishes
/// duplicates of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pair {
    pub id: i32,
    pub tag: u32,
}

impl Pair {
    pub fn new(id: i32, tag: u32) -> Self {
        Pair { id, tag }
    }
}

impl Record for Pair {
    type Key = i32;
    const SIZE: usize = 8;

    fn key(&self) -> i32 {
        self.id
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Pair {
            id: i32::from_le_bytes(buf[..4].try_into().unwrap()),
            tag: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
        }
    }
}

/// 12-byte record pairing an integer key with a floating-point value.
/// Ordering uses `f64::total_cmp` so every bit pattern has a defined
/// place in the tree.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub id: i32,
    pub value: f64,
}

impl Measurement {
    pub fn new(id: i32, value: f64) -> Self {
        Measurement { id, value }
    }
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Measurement {}

impl PartialOrd for Measurement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Measurement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.value.total_cmp(&other.value))
    }
}

impl Record for Measurement {
    type Key = i32;
    const SIZE: usize = 12;

    fn key(&self) -> i32 {
        self.id
    }

    fn write_to(&self, buf: &mut [u8]) {
        buf[..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..12].copy_from_slice(&self.value.to_le_bytes());
    }

    fn read_from(buf: &[u8]) -> Self {
        Measurement {
            id: i32::from_le_bytes(buf[..4].try_into().unwrap()),
            value: f64::from_le_bytes(buf[4..12].try_into().unwrap()),
        }
    }
}
