//! Error types for the index.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in the index.
///
/// By having a single error type, error handling stays consistent across
/// the storage and tree layers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation requires an open tree.
    #[error("tree is not open")]
    Closed,

    /// Operation requires a closed tree.
    #[error("tree is already open")]
    AlreadyOpen,

    /// Mutating operation on a tree opened read-only.
    #[error("tree is open read-only")]
    ReadOnly,

    /// Requested page lies beyond the end of the index file.
    #[error("page at offset {0} not found")]
    PageNotFound(i64),

    /// A tree parameter is invalid for the record type or current state.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// On-disk data failed validation while being read back.
    #[error("corrupt index data: {0}")]
    Corrupt(String),
}
