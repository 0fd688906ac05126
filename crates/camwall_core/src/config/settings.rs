//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::models::{RecordingMode, ResolutionClass, StorageFlavor};
use crate::workers::WorkerSpec;

/// Frame rate assumed when converting buffering time into frame counts.
pub const ASSUMED_FPS: u32 = 25;

/// One mebibyte, the unit of `StorageConfig::blocksize_mb`.
pub const MB: u64 = 1024 * 1024;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// GPU buffer pool sizing and CPU pinning.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Block storage geometry and recording.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Machine-vision worker pool.
    #[serde(default)]
    pub workers: WorkerSettings,
}

/// Locations of persisted state. Relative paths resolve against the
/// directory holding the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory of the block storage descriptor and data file.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Persisted window layout.
    #[serde(default = "default_layout_file")]
    pub layout_file: String,

    /// Device collection.
    #[serde(default = "default_devices_file")]
    pub devices_file: String,
}

fn default_storage_dir() -> String {
    "fs".to_string()
}

fn default_logs_folder() -> String {
    "logs".to_string()
}

fn default_layout_file() -> String {
    "layout.json".to_string()
}

fn default_devices_file() -> String {
    "devices.json".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            logs_folder: default_logs_folder(),
            layout_file: default_layout_file(),
            devices_file: default_devices_file(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is not set.
    #[serde(default)]
    pub level: LogLevel,

    /// Also write a rolling log file under `paths.logs_folder`.
    #[serde(default = "default_true")]
    pub file_logging: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file_logging: true,
        }
    }
}

/// GPU buffer pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Buffering time in milliseconds.
    #[serde(default = "default_msbuftime")]
    pub msbuftime: u32,

    /// Number of 720p streams.
    #[serde(default = "default_stream_count")]
    pub n_720p: u32,

    /// Number of 1080p streams.
    #[serde(default = "default_stream_count")]
    pub n_1080p: u32,

    /// Number of 1440p streams.
    #[serde(default)]
    pub n_1440p: u32,

    /// Number of 4K streams.
    #[serde(default)]
    pub n_4k: u32,

    /// Pin capture and upload threads to dedicated cores.
    #[serde(default)]
    pub bind: bool,
}

fn default_msbuftime() -> u32 {
    300
}

fn default_stream_count() -> u32 {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            msbuftime: default_msbuftime(),
            n_720p: default_stream_count(),
            n_1080p: default_stream_count(),
            n_1440p: 0,
            n_4k: 0,
            bind: false,
        }
    }
}

impl MemoryConfig {
    pub const MSBUFTIME_RANGE: (u32, u32) = (50, 1000);
    pub const MAX_STREAMS: u32 = 1024;

    /// Frames accumulated during one buffering period.
    pub fn frames_per_buffer(&self) -> u32 {
        (self.msbuftime as f64 * ASSUMED_FPS as f64 / 1000.0).round() as u32
    }

    /// Configured stream count for a resolution class.
    pub fn stream_count(&self, class: ResolutionClass) -> u32 {
        match class {
            ResolutionClass::P720 => self.n_720p,
            ResolutionClass::P1080 => self.n_1080p,
            ResolutionClass::P1440 => self.n_1440p,
            ResolutionClass::K4 => self.n_4k,
        }
    }

    /// Pool size (in frames) for a resolution class.
    pub fn pool_frames(&self, class: ResolutionClass) -> u32 {
        self.stream_count(class).saturating_mul(self.frames_per_buffer())
    }

    /// Clamp out-of-range values. Returns `true` if anything changed.
    pub fn clamp(&mut self) -> bool {
        let before = self.clone();
        let (lo, hi) = Self::MSBUFTIME_RANGE;
        self.msbuftime = self.msbuftime.clamp(lo, hi);
        for count in [
            &mut self.n_720p,
            &mut self.n_1080p,
            &mut self.n_1440p,
            &mut self.n_4k,
        ] {
            *count = (*count).min(Self::MAX_STREAMS);
        }
        *self != before
    }
}

/// Block storage geometry and recording switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Block size in MB.
    #[serde(default = "default_blocksize_mb")]
    pub blocksize_mb: u64,

    /// Number of blocks.
    #[serde(default = "default_n_blocks")]
    pub n_blocks: u64,

    /// Storage flavor.
    #[serde(default)]
    pub fs_flavor: StorageFlavor,

    /// Partition id, only meaningful for the partition flavor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_uuid: Option<String>,

    /// Record every bound camera into storage.
    #[serde(default)]
    pub record: bool,
}

fn default_blocksize_mb() -> u64 {
    10
}

fn default_n_blocks() -> u64 {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blocksize_mb: default_blocksize_mb(),
            n_blocks: default_n_blocks(),
            fs_flavor: StorageFlavor::File,
            partition_uuid: None,
            record: false,
        }
    }
}

impl StorageConfig {
    pub const BLOCKSIZE_MB_RANGE: (u64, u64) = (1, 64 * 1024);
    pub const N_BLOCKS_RANGE: (u64, u64) = (1, 1 << 24);

    /// Block size converted to bytes. `None` if it does not fit in a `u64`.
    pub fn block_size_bytes(&self) -> Option<u64> {
        self.blocksize_mb.checked_mul(MB)
    }

    /// Clamp out-of-range geometry. Returns `true` if anything changed.
    pub fn clamp(&mut self) -> bool {
        let before = (self.blocksize_mb, self.n_blocks);
        let (lo, hi) = Self::BLOCKSIZE_MB_RANGE;
        self.blocksize_mb = self.blocksize_mb.clamp(lo, hi);
        let (lo, hi) = Self::N_BLOCKS_RANGE;
        self.n_blocks = self.n_blocks.clamp(lo, hi);
        (self.blocksize_mb, self.n_blocks) != before
    }

    /// Partition id as it takes part in geometry identity.
    ///
    /// Always `None` for the file flavor, whatever the field holds.
    pub fn partition_id(&self) -> Option<&str> {
        match self.fs_flavor {
            StorageFlavor::File => None,
            StorageFlavor::Partition => self.partition_uuid.as_deref(),
        }
    }

    /// Recording policy for the live chain group.
    pub fn recording_mode(&self) -> RecordingMode {
        if self.record {
            RecordingMode::Always
        } else {
            RecordingMode::Never
        }
    }
}

/// Machine-vision worker definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default)]
    pub specs: Vec<WorkerSpec>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            specs: vec![WorkerSpec::new("Movement Detector", "movement", 2)],
        }
    }
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Memory,
    Storage,
    Workers,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Memory,
        ConfigSection::Storage,
        ConfigSection::Workers,
    ];

    /// TOML table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Memory => "memory",
            ConfigSection::Storage => "storage",
            ConfigSection::Workers => "workers",
        }
    }

    /// Comment written above the table.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Storage, log and layout locations",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Memory => "GPU buffer pool sizing (saving restarts all services)",
            ConfigSection::Storage => "Recording block storage (changing geometry erases recordings)",
            ConfigSection::Workers => "Machine vision workers",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_per_buffer_rounds() {
        let mut mem = MemoryConfig::default();
        mem.msbuftime = 300;
        assert_eq!(mem.frames_per_buffer(), 8); // 7.5 rounds up
        mem.msbuftime = 1000;
        assert_eq!(mem.frames_per_buffer(), 25);
    }

    #[test]
    fn pool_frames_scales_with_stream_count() {
        let mem = MemoryConfig {
            msbuftime: 400,
            n_720p: 2,
            n_1080p: 3,
            n_1440p: 0,
            n_4k: 1,
            bind: false,
        };
        assert_eq!(mem.pool_frames(ResolutionClass::P720), 20);
        assert_eq!(mem.pool_frames(ResolutionClass::P1080), 30);
        assert_eq!(mem.pool_frames(ResolutionClass::P1440), 0);
        assert_eq!(mem.pool_frames(ResolutionClass::K4), 10);
    }

    #[test]
    fn clamp_fixes_out_of_range() {
        let mut mem = MemoryConfig {
            msbuftime: 10,
            n_720p: 5000,
            ..MemoryConfig::default()
        };
        assert!(mem.clamp());
        assert_eq!(mem.msbuftime, 50);
        assert_eq!(mem.n_720p, 1024);
        assert!(!mem.clamp());
    }

    #[test]
    fn file_flavor_ignores_partition_id() {
        let cfg = StorageConfig {
            partition_uuid: Some("abcd".to_string()),
            ..StorageConfig::default()
        };
        assert_eq!(cfg.partition_id(), None);
        assert_eq!(cfg.block_size_bytes(), Some(10 * MB));
    }

    #[test]
    fn huge_block_size_does_not_overflow() {
        let mut cfg = StorageConfig {
            blocksize_mb: u64::MAX / 1024,
            n_blocks: 0,
            ..StorageConfig::default()
        };
        assert_eq!(cfg.block_size_bytes(), None);

        assert!(cfg.clamp());
        assert_eq!(cfg.blocksize_mb, StorageConfig::BLOCKSIZE_MB_RANGE.1);
        assert_eq!(cfg.n_blocks, 1);
        assert!(cfg.block_size_bytes().is_some());
        assert!(!cfg.clamp());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let settings = Settings::default();
        let text = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
