//! Fixed-size block storage for recordings.
//!
//! A store is a directory holding a checksummed descriptor plus, for the
//! file flavor, a data file of `block_count` blocks. Changing the geometry
//! recreates the store and makes every earlier recording unreadable.

mod descriptor;
mod geometry;
mod handle;
mod manager;

pub use descriptor::{StorageDescriptor, DESCRIPTOR_FILE};
pub use geometry::{decide, Decision, StorageGeometry};
pub use handle::{StorageHandle, BLOCK_HEADER_LEN, DATA_FILE};
pub use manager::StorageGeometryManager;

use std::io;
use std::path::Path;

use thiserror::Error;

/// Errors from block storage.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Descriptor missing, corrupt or unparsable. Recovered by recreating.
    #[error("Failed to load storage descriptor {path}: {reason}")]
    LoadError { path: String, reason: String },

    #[error("Block storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Block {index} out of range (store has {count} blocks)")]
    BlockOutOfRange { index: u64, count: u64 },

    #[error("Block payload of {len} bytes exceeds {max} bytes")]
    BlockTooLarge { len: u64, max: u64 },
}

impl StorageError {
    pub fn load(path: &Path, reason: impl Into<String>) -> Self {
        StorageError::LoadError {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
