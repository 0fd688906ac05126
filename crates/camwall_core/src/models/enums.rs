//! Core enums used throughout the application.

use serde::{Deserialize, Serialize};

/// Backing flavor of the on-disk block storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFlavor {
    /// Regular file inside the storage directory.
    #[default]
    File,
    /// Raw disk partition, addressed by partition id.
    Partition,
}

impl std::fmt::Display for StorageFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageFlavor::File => write!(f, "file"),
            StorageFlavor::Partition => write!(f, "partition"),
        }
    }
}

/// Recording policy applied to a live chain group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingMode {
    /// Record-slot streams are not routed to storage.
    #[default]
    Never,
    /// Every bound camera records continuously.
    Always,
}

impl RecordingMode {
    /// Whether this mode routes streams into storage.
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingMode::Always)
    }
}

impl std::fmt::Display for RecordingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingMode::Never => write!(f, "never"),
            RecordingMode::Always => write!(f, "always"),
        }
    }
}

/// Resolution classes the GPU buffer pool is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionClass {
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "4K")]
    K4,
}

impl ResolutionClass {
    /// All classes, smallest first.
    pub const ALL: [ResolutionClass; 4] = [
        ResolutionClass::P720,
        ResolutionClass::P1080,
        ResolutionClass::P1440,
        ResolutionClass::K4,
    ];
}

impl std::fmt::Display for ResolutionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionClass::P720 => write!(f, "720p"),
            ResolutionClass::P1080 => write!(f, "1080p"),
            ResolutionClass::P1440 => write!(f, "1440p"),
            ResolutionClass::K4 => write!(f, "4K"),
        }
    }
}

/// Which capture thread feeds a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Network (RTSP) capture thread.
    Live,
    /// Local USB (V4L2) capture thread.
    Usb,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureKind::Live => write!(f, "live"),
            CaptureKind::Usb => write!(f, "usb"),
        }
    }
}
