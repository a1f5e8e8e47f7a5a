//! Common types and utilities shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants
//! - Error types
//! - The [`PageOffset`] identifier

pub mod config;
pub mod error;
mod offset;

pub use error::{Error, Result};
pub use offset::PageOffset;
