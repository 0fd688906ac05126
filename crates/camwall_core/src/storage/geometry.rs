//! Storage geometry and the reuse-or-recreate decision.

use serde::{Deserialize, Serialize};

use super::handle::StorageHandle;
use super::{StorageError, StorageResult};
use crate::config::StorageConfig;
use crate::models::StorageFlavor;

/// Identity of a block store. Two stores with equal geometry are
/// interchangeable; any difference means the recorded data cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageGeometry {
    pub flavor: StorageFlavor,
    pub partition_id: Option<String>,
    pub block_size_bytes: u64,
    pub block_count: u64,
}

impl StorageGeometry {
    /// Geometry requested by a storage config.
    ///
    /// Fails when the block size or the total size does not fit in a `u64`.
    pub fn from_config(cfg: &StorageConfig) -> StorageResult<Self> {
        let block_size_bytes = cfg
            .block_size_bytes()
            .filter(|size| size.checked_mul(cfg.n_blocks).is_some())
            .ok_or_else(|| {
                StorageError::Unavailable(format!(
                    "{} blocks of {} MB exceed the addressable size",
                    cfg.n_blocks, cfg.blocksize_mb
                ))
            })?;
        Ok(Self {
            flavor: cfg.fs_flavor,
            partition_id: cfg.partition_id().map(str::to_string),
            block_size_bytes,
            block_count: cfg.n_blocks,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.block_size_bytes.saturating_mul(self.block_count)
    }
}

/// Outcome of comparing existing storage with the configured geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Existing storage matches; keep it and its recordings.
    Reuse,
    /// Storage is absent, unreadable, or has another geometry; create anew.
    Recreate,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Reuse => write!(f, "reuse"),
            Decision::Recreate => write!(f, "recreate"),
        }
    }
}

/// `Reuse` iff a handle exists and all four geometry fields match `cfg`.
pub fn decide(existing: Option<&StorageHandle>, cfg: &StorageConfig) -> Decision {
    let wanted = StorageGeometry::from_config(cfg).ok();
    match existing {
        Some(handle) if Some(handle.geometry()) == wanted.as_ref() => Decision::Reuse,
        _ => Decision::Recreate,
    }
}
