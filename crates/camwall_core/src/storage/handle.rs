//! Open block store and block I/O.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::descriptor::StorageDescriptor;
use super::geometry::StorageGeometry;
use super::{StorageError, StorageResult};
use crate::models::StorageFlavor;
use crate::native::PlaybackStorage;

/// Data file of the file flavor.
pub const DATA_FILE: &str = "blocks.dat";

/// Directory holding partition device nodes by partition uuid.
pub const PARTUUID_DIR: &str = "/dev/disk/by-partuuid";

const BLOCK_MAGIC: u32 = 0x4357_424b; // "CWBK"
/// Header bytes in front of every block: magic, epoch, payload length.
pub const BLOCK_HEADER_LEN: u64 = 4 + 8 + 8;

/// An opened block store.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    dir: PathBuf,
    descriptor: StorageDescriptor,
}

impl StorageHandle {
    pub(super) fn new(dir: PathBuf, descriptor: StorageDescriptor) -> Self {
        Self { dir, descriptor }
    }

    pub fn geometry(&self) -> &StorageGeometry {
        &self.descriptor.geometry
    }

    pub fn epoch(&self) -> u64 {
        self.descriptor.epoch
    }

    pub fn descriptor(&self) -> &StorageDescriptor {
        &self.descriptor
    }

    /// Directory holding the descriptor.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where block data lives for this flavor.
    pub fn data_path(&self) -> PathBuf {
        data_path(&self.dir, self.geometry())
    }

    /// Largest payload one block can carry.
    pub fn max_payload(&self) -> u64 {
        self.geometry()
            .block_size_bytes
            .saturating_sub(BLOCK_HEADER_LEN)
    }

    /// What the playback manager needs to read and record.
    pub fn playback_storage(&self) -> PlaybackStorage {
        PlaybackStorage {
            dir: self.dir.clone(),
            block_size_bytes: self.geometry().block_size_bytes,
            block_count: self.geometry().block_count,
            epoch: self.epoch(),
        }
    }

    fn offset(&self, index: u64) -> StorageResult<u64> {
        let count = self.geometry().block_count;
        if index >= count {
            return Err(StorageError::BlockOutOfRange { index, count });
        }
        index
            .checked_mul(self.geometry().block_size_bytes)
            .ok_or_else(|| StorageError::Unavailable(format!("block {} lies beyond the addressable range", index)))
    }

    /// Write one block under the current epoch.
    pub fn write_block(&self, index: u64, payload: &[u8]) -> StorageResult<()> {
        let offset = self.offset(index)?;
        let len = payload.len() as u64;
        if len > self.max_payload() {
            return Err(StorageError::BlockTooLarge {
                len,
                max: self.max_payload(),
            });
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if self.geometry().flavor == StorageFlavor::File {
            options.create(true);
        }
        let mut file = options.open(self.data_path())?;

        let mut header = Vec::with_capacity(BLOCK_HEADER_LEN as usize);
        header.extend_from_slice(&BLOCK_MAGIC.to_le_bytes());
        header.extend_from_slice(&self.epoch().to_le_bytes());
        header.extend_from_slice(&len.to_le_bytes());

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&header)?;
        file.write_all(payload)?;
        file.sync_data()?;
        Ok(())
    }

    /// Read one block. `None` if the block was never written under the
    /// current epoch.
    pub fn read_block(&self, index: u64) -> StorageResult<Option<Vec<u8>>> {
        let offset = self.offset(index)?;
        let mut file = match File::open(self.data_path()) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; BLOCK_HEADER_LEN as usize];
        match file.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let (magic, rest) = header.split_at(4);
        let (epoch, len) = rest.split_at(8);
        let magic = u32::from_le_bytes(magic.try_into().unwrap_or_default());
        let epoch = u64::from_le_bytes(epoch.try_into().unwrap_or_default());
        let len = u64::from_le_bytes(len.try_into().unwrap_or_default());

        if magic != BLOCK_MAGIC || epoch != self.epoch() || len > self.max_payload() {
            return Ok(None);
        }

        let mut payload = vec![0u8; len as usize];
        match file.read_exact(&mut payload) {
            Ok(()) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Data location for a geometry stored under `dir`.
pub fn data_path(dir: &Path, geometry: &StorageGeometry) -> PathBuf {
    match (&geometry.flavor, &geometry.partition_id) {
        (StorageFlavor::Partition, Some(id)) => Path::new(PARTUUID_DIR).join(id),
        _ => dir.join(DATA_FILE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageGeometryManager;
    use tempfile::tempdir;

    fn small_geometry() -> StorageGeometry {
        StorageGeometry {
            flavor: StorageFlavor::File,
            partition_id: None,
            block_size_bytes: 256,
            block_count: 4,
        }
    }

    #[test]
    fn written_block_reads_back() {
        let dir = tempdir().unwrap();
        let handle = StorageGeometryManager::new(dir.path())
            .create(&small_geometry())
            .unwrap();

        handle.write_block(2, b"frame data").unwrap();
        assert_eq!(handle.read_block(2).unwrap().as_deref(), Some(&b"frame data"[..]));
        assert_eq!(handle.read_block(0).unwrap(), None);
    }

    #[test]
    fn index_past_count_is_rejected() {
        let dir = tempdir().unwrap();
        let handle = StorageGeometryManager::new(dir.path())
            .create(&small_geometry())
            .unwrap();

        assert!(matches!(
            handle.write_block(4, b"x"),
            Err(StorageError::BlockOutOfRange { index: 4, count: 4 })
        ));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let dir = tempdir().unwrap();
        let handle = StorageGeometryManager::new(dir.path())
            .create(&small_geometry())
            .unwrap();

        let payload = vec![0u8; 256];
        assert!(matches!(
            handle.write_block(0, &payload),
            Err(StorageError::BlockTooLarge { .. })
        ));
    }

    #[test]
    fn partition_flavor_targets_device_node() {
        let geometry = StorageGeometry {
            flavor: StorageFlavor::Partition,
            partition_id: Some("0a1b-22".to_string()),
            ..small_geometry()
        };
        assert_eq!(
            data_path(Path::new("/tmp/fs"), &geometry),
            PathBuf::from("/dev/disk/by-partuuid/0a1b-22")
        );
    }
}
