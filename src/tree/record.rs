//! Record and key traits.
//!
//! The tree is generic over the records it stores. A record serializes to a
//! fixed number of bytes and exposes a fixed-size key; node capacities are
//! derived from these sizes and the page size when a tree is constructed.
//!
//! Records are kept in full [`Ord`] order inside leaves, and that order must
//! refine the key order: records comparing equal must be the same record,
//! and `a < b` must imply `a.key() <= b.key()`. Distinct records with equal
//! keys are how duplicates are represented.

/// A fixed-size, totally ordered key.
///
/// Inner pages store separator keys in this serialized form.
pub trait Key: Ord + Clone + std::fmt::Debug {
    /// Serialized size in bytes. Every key of the type occupies exactly
    /// this many bytes on disk.
    const SIZE: usize;

    /// Serialize into `buf`, which is exactly `SIZE` bytes long.
    fn write_to(&self, buf: &mut [u8]);

    /// Deserialize from `buf`, which is exactly `SIZE` bytes long.
    fn read_from(buf: &[u8]) -> Self;
}

/// A fixed-size record stored in leaf pages.
///
/// The record's `Ord` implementation is the total order the tree maintains;
/// it must be consistent with the order of the keys it exposes.
pub trait Record: Ord + Clone + std::fmt::Debug {
    /// Key type this record is indexed by.
    type Key: Key;

    /// Serialized size in bytes.
    const SIZE: usize;

    /// The key of this record.
    fn key(&self) -> Self::Key;

    /// Serialize into `buf`, which is exactly `SIZE` bytes long.
    fn write_to(&self, buf: &mut [u8]);

    /// Deserialize from `buf`, which is exactly `SIZE` bytes long.
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_key_for_int {
    ($($t:ty),*) => {
        $(impl Key for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn write_to(&self, buf: &mut [u8]) {
                buf.copy_from_slice(&self.to_le_bytes());
            }

            fn read_from(buf: &[u8]) -> Self {
                <$t>::from_le_bytes(buf.try_into().expect("key buffer of wrong size"))
            }
        })*
    };
}

impl_key_for_int!(i16, i32, i64, u16, u32, u64);
