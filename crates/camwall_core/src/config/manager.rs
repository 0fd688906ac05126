//! Config manager for loading, saving, and atomic updates.
//!
//! Key features:
//! - Atomic writes (write to temp file, then rename)
//! - Section-level updates (only modified section is changed)
//! - Validation on load (unknown tables dropped, out-of-range values clamped)
//! - Preserves comments and formatting of untouched sections with toml_edit

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};
use crate::models::SlotError;

/// Errors that can occur during config operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Failed to (de)serialize device collection: {0}")]
    DeviceJson(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidSlot(#[from] SlotError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid camera address range: {0}")]
    InvalidAddress(String),
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Manages application configuration.
///
/// Handles loading, saving, and atomic section-level updates.
pub struct ConfigManager {
    /// Path to the config file.
    config_path: PathBuf,
    /// Current settings loaded in memory.
    settings: Settings,
}

impl ConfigManager {
    /// Create a new config manager with the given config file path.
    ///
    /// Does not load the config - call `load()` or `load_or_create()` after.
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            settings: Settings::default(),
        }
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Directory holding the config file; relative paths resolve against it.
    pub fn config_dir(&self) -> PathBuf {
        self.config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Resolve a configured path against the config directory.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = PathBuf::from(configured);
        if path.is_absolute() {
            path
        } else {
            self.config_dir().join(path)
        }
    }

    /// Get a reference to the current settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a mutable reference to the current settings.
    ///
    /// Note: Changes made here are only in memory until `save()` or
    /// `update_section()` is called.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Load config from file.
    ///
    /// Returns error if file doesn't exist.
    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.config_path.exists() {
            return Err(ConfigError::NotFound(self.config_path.clone()));
        }

        let content = fs::read_to_string(&self.config_path)?;
        let (settings, _) = self.parse_validate_and_clean(&content)?;
        self.settings = settings;
        Ok(())
    }

    /// Load config from file, creating with defaults if it doesn't exist.
    ///
    /// Also validates and cleans up the config, saving if changes were made.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)?;
            let (settings, was_modified) = self.parse_validate_and_clean(&content)?;
            self.settings = settings;

            if was_modified {
                tracing::info!("Config at {} cleaned up, rewriting", self.config_path.display());
                self.save()?;
            }
        } else {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("Wrote default config to {}", self.config_path.display());
        }
        Ok(())
    }

    /// Ensure the storage and log directories exist.
    pub fn ensure_dirs_exist(&self) -> ConfigResult<()> {
        for dir in [self.storage_dir(), self.logs_folder()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Block storage directory.
    pub fn storage_dir(&self) -> PathBuf {
        self.resolve(&self.settings.paths.storage_dir)
    }

    /// Logs folder.
    pub fn logs_folder(&self) -> PathBuf {
        self.resolve(&self.settings.paths.logs_folder)
    }

    /// Persisted layout file.
    pub fn layout_file(&self) -> PathBuf {
        self.resolve(&self.settings.paths.layout_file)
    }

    /// Device collection file.
    pub fn devices_file(&self) -> PathBuf {
        self.resolve(&self.settings.paths.devices_file)
    }

    /// Parse, validate, and clean up config content.
    ///
    /// Returns the settings and whether any modifications were made.
    fn parse_validate_and_clean(&self, content: &str) -> ConfigResult<(Settings, bool)> {
        let doc: DocumentMut = content.parse()?;

        // Missing fields pick up their serde defaults here
        let mut settings: Settings = toml::from_str(content)?;

        let valid_sections: Vec<&str> = ConfigSection::ALL.iter().map(|s| s.table_name()).collect();
        let has_unknown = doc.iter().any(|(key, _)| !valid_sections.contains(&key));
        if has_unknown {
            tracing::warn!("Config contains unknown sections, they will be dropped");
        }

        let mut clamped = false;
        if settings.memory.clamp() {
            tracing::warn!("Memory config values out of range, clamped");
            clamped = true;
        }
        if settings.storage.clamp() {
            tracing::warn!("Storage geometry out of range, clamped");
            clamped = true;
        }

        let missing_section = ConfigSection::ALL
            .iter()
            .any(|s| doc.get(s.table_name()).is_none());

        let reparsed: Settings = toml::from_str(&toml::to_string_pretty(&settings)?)?;
        let was_modified = has_unknown || clamped || missing_section || reparsed != settings;

        Ok((settings, was_modified))
    }

    /// Save the entire config atomically.
    ///
    /// Writes to a temp file first, then renames to ensure atomic write.
    pub fn save(&self) -> ConfigResult<()> {
        let content = self.generate_config_with_comments()?;
        self.atomic_write(&content)?;
        Ok(())
    }

    /// Update a specific section atomically.
    ///
    /// This re-reads the file from disk, updates only the specified section,
    /// and writes back atomically. Other sections keep their on-disk text.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let current_content = if self.config_path.exists() {
            fs::read_to_string(&self.config_path)?
        } else {
            String::new()
        };

        let mut doc: DocumentMut = if current_content.is_empty() {
            DocumentMut::new()
        } else {
            current_content.parse()?
        };

        let section_toml = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
            ConfigSection::Memory => toml::to_string_pretty(&self.settings.memory)?,
            ConfigSection::Storage => toml::to_string_pretty(&self.settings.storage)?,
            ConfigSection::Workers => toml::to_string_pretty(&self.settings.workers)?,
        };

        let section_doc: DocumentMut = section_toml.parse()?;
        let mut section_table = section_doc.as_table().clone();
        section_table
            .decor_mut()
            .set_prefix(format!("\n# {}\n", section.comment()));

        doc[section.table_name()] = Item::Table(section_table);

        self.atomic_write(&doc.to_string())?;
        tracing::debug!("Updated [{}] in {}", section.table_name(), self.config_path.display());

        Ok(())
    }

    /// Generate config content with a comment above every section.
    fn generate_config_with_comments(&self) -> ConfigResult<String> {
        let mut doc: DocumentMut = toml::to_string_pretty(&self.settings)?.parse()?;

        for section in ConfigSection::ALL {
            if let Some(table) = doc
                .get_mut(section.table_name())
                .and_then(Item::as_table_mut)
            {
                table
                    .decor_mut()
                    .set_prefix(format!("\n# {}\n", section.comment()));
            }
        }

        let mut output = String::new();
        output.push_str("# camwall configuration\n");
        output.push_str("# This file is auto-generated. Comments may be preserved on section updates.\n");
        output.push_str(&doc.to_string());
        Ok(output)
    }

    /// Write content to config file atomically.
    ///
    /// Writes to a temp file first, then renames.
    fn atomic_write(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.config_path.with_extension("toml.tmp");

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StorageFlavor;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("live").join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[memory]"));
        assert!(content.contains("[storage]"));
        assert!(content.contains("# Recording block storage"));
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        fs::write(&config_path, "[storage]\nblocksize_mb = 100\nn_blocks = 1000\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().storage.blocksize_mb, 100);
        assert_eq!(manager.settings().storage.n_blocks, 1000);
        // Missing sections were filled in and written back
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[memory]"));
    }

    #[test]
    fn out_of_range_memory_is_clamped_on_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");
        fs::write(&config_path, "[memory]\nmsbuftime = 5000\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();
        assert_eq!(manager.settings().memory.msbuftime, 1000);
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        // Edit memory on disk behind the manager's back
        let content = fs::read_to_string(&config_path).unwrap();
        fs::write(&config_path, content.replace("msbuftime = 300", "msbuftime = 500")).unwrap();

        manager.settings_mut().storage.fs_flavor = StorageFlavor::Partition;
        manager.settings_mut().storage.partition_uuid = Some("1234-abcd".to_string());
        manager.update_section(ConfigSection::Storage).unwrap();

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings().storage.fs_flavor, StorageFlavor::Partition);
        assert_eq!(
            reloaded.settings().storage.partition_uuid.as_deref(),
            Some("1234-abcd")
        );
        assert_eq!(reloaded.settings().memory.msbuftime, 500);
    }

    #[test]
    fn atomic_write_creates_no_temp_on_success() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("settings.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        let temp_path = config_path.with_extension("toml.tmp");
        assert!(!temp_path.exists());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("settings.toml"));
        assert_eq!(manager.storage_dir(), dir.path().join("fs"));
        assert_eq!(manager.layout_file(), dir.path().join("layout.json"));
    }
}
