//! Configuration management for camwall.
//!
//! This module provides:
//! - TOML-based settings with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - The device collection, persisted separately as JSON
//!
//! # Example
//!
//! ```no_run
//! use camwall_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/camwall/settings.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().storage.record = true;
//!
//! // Save just the storage section atomically
//! config.update_section(ConfigSection::Storage).unwrap();
//! ```

mod devices;
mod manager;
mod settings;

pub use devices::{AutoGenerate, DeviceStore};
pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, LoggingSettings, MemoryConfig, PathSettings, Settings, StorageConfig,
    WorkerSettings, ASSUMED_FPS, MB,
};
