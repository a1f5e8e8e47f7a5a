//! Storage layer - disk I/O and tree metadata persistence.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level page-granular file I/O and offset allocation
//! - [`TreeSnapshot`] - Serialized tree metadata for reopening an index

mod disk_manager;
mod snapshot;

pub use disk_manager::DiskManager;
pub use snapshot::TreeSnapshot;
