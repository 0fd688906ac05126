//! Loading, creating and opening block storage.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use super::descriptor::StorageDescriptor;
use super::geometry::{decide, Decision, StorageGeometry};
use super::handle::{data_path, StorageHandle};
use super::{StorageError, StorageResult};
use crate::config::StorageConfig;
use crate::models::StorageFlavor;

/// Owns the storage directory and decides between reuse and recreate.
#[derive(Debug, Clone)]
pub struct StorageGeometryManager {
    dir: PathBuf,
}

impl StorageGeometryManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the store described in the directory.
    pub fn load(&self) -> StorageResult<StorageHandle> {
        let descriptor = StorageDescriptor::read(&self.dir)?;
        Ok(StorageHandle::new(self.dir.clone(), descriptor))
    }

    /// Create a store with `geometry`, replacing any existing descriptor.
    ///
    /// Destroys previously recorded data: a new epoch is drawn and, for the
    /// file flavor, the data file is truncated.
    pub fn create(&self, geometry: &StorageGeometry) -> StorageResult<StorageHandle> {
        if geometry.block_size_bytes == 0 || geometry.block_count == 0 {
            return Err(StorageError::Unavailable(
                "block size and block count must be non-zero".to_string(),
            ));
        }

        let previous_epoch = StorageDescriptor::read(&self.dir).ok().map(|d| d.epoch);
        let epoch = next_epoch(previous_epoch)?;

        std::fs::create_dir_all(&self.dir)?;
        let data = data_path(&self.dir, geometry);
        match geometry.flavor {
            StorageFlavor::File => {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&data)?;
            }
            StorageFlavor::Partition => {
                if geometry.partition_id.is_none() || !data.exists() {
                    return Err(StorageError::Unavailable(format!(
                        "partition {} not present",
                        data.display()
                    )));
                }
            }
        }

        let descriptor = StorageDescriptor::new(geometry.clone(), epoch);
        descriptor.write(&self.dir)?;

        tracing::warn!(
            dir = %self.dir.display(),
            flavor = %geometry.flavor,
            block_size_bytes = geometry.block_size_bytes,
            block_count = geometry.block_count,
            epoch,
            "Created block storage, previous recordings are gone"
        );
        Ok(StorageHandle::new(self.dir.clone(), descriptor))
    }

    /// Load existing storage, or recreate it when absent, corrupt, or of
    /// another geometry than `cfg`.
    pub fn open(&self, cfg: &StorageConfig) -> StorageResult<(StorageHandle, Decision)> {
        if cfg.fs_flavor == StorageFlavor::Partition && cfg.partition_id().is_none() {
            return Err(StorageError::Unavailable(
                "partition flavor requires a partition id".to_string(),
            ));
        }
        let wanted = StorageGeometry::from_config(cfg)?;

        let existing = match self.load() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Could not load block storage: {}", e);
                None
            }
        };

        match decide(existing.as_ref(), cfg) {
            Decision::Reuse => {
                let handle = existing.ok_or_else(|| {
                    StorageError::Unavailable("storage vanished while opening".to_string())
                })?;
                tracing::info!(epoch = handle.epoch(), "Reusing block storage");
                Ok((handle, Decision::Reuse))
            }
            Decision::Recreate => {
                let handle = self.create(&wanted)?;
                Ok((handle, Decision::Recreate))
            }
        }
    }
}

/// Epoch for a new store: current time in nanoseconds, strictly after
/// the previous epoch.
fn next_epoch(previous: Option<u64>) -> StorageResult<u64> {
    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |n| n.max(0) as u64);
    match previous {
        Some(prev) if now <= prev => prev.checked_add(1).ok_or_else(|| {
            StorageError::Unavailable("storage epochs exhausted".to_string())
        }),
        _ => Ok(now),
    }
}
