//! On-disk storage descriptor (`storage.json`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::geometry::StorageGeometry;
use super::{StorageError, StorageResult};

/// Descriptor file name inside the storage directory.
pub const DESCRIPTOR_FILE: &str = "storage.json";

/// Persisted description of a block store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDescriptor {
    #[serde(flatten)]
    pub geometry: StorageGeometry,
    /// Changes on every create; blocks of another epoch are unreadable.
    pub epoch: u64,
    pub created_at: String,
    /// SHA-256 of the other fields' canonical JSON.
    pub checksum: String,
}

/// Fields covered by the checksum.
#[derive(Serialize)]
struct ChecksumBody<'a> {
    #[serde(flatten)]
    geometry: &'a StorageGeometry,
    epoch: u64,
    created_at: &'a str,
}

impl StorageDescriptor {
    /// New descriptor stamped with the current time.
    pub fn new(geometry: StorageGeometry, epoch: u64) -> Self {
        let mut descriptor = Self {
            geometry,
            epoch,
            created_at: chrono::Utc::now().to_rfc3339(),
            checksum: String::new(),
        };
        descriptor.checksum = descriptor.compute_checksum();
        descriptor
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(DESCRIPTOR_FILE)
    }

    fn compute_checksum(&self) -> String {
        let body = ChecksumBody {
            geometry: &self.geometry,
            epoch: self.epoch,
            created_at: &self.created_at,
        };
        let json = serde_json::to_string(&body).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Read and verify the descriptor in `dir`.
    pub fn read(dir: &Path) -> StorageResult<Self> {
        let path = Self::path(dir);
        let content = fs::read_to_string(&path)
            .map_err(|e| StorageError::load(&path, format!("cannot read: {}", e)))?;
        let descriptor: Self = serde_json::from_str(&content)
            .map_err(|e| StorageError::load(&path, format!("cannot parse: {}", e)))?;
        if !descriptor.verify() {
            return Err(StorageError::load(&path, "checksum mismatch"));
        }
        if descriptor.geometry.block_size_bytes == 0 || descriptor.geometry.block_count == 0 {
            return Err(StorageError::load(&path, "empty geometry"));
        }
        Ok(descriptor)
    }

    /// Write the descriptor into `dir` atomically, replacing any existing one.
    pub fn write(&self, dir: &Path) -> StorageResult<()> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir);
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
