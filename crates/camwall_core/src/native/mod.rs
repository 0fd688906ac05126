//! Interface to the native capture, GPU and storage services.
//!
//! Decoding, GPU upload and recording happen in native code this crate
//! never looks inside. It only opens services, binds stream slots to them,
//! and closes them again in two phases (signal, then join).

mod plan;
mod simulated;

pub use plan::{CpuPlan, GpuPoolPlan};
pub use simulated::{JournalEntry, SimulatedServices};

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::CaptureKind;

/// Opaque handle to an opened native service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Identity of one stream-slot binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Kind of native service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    CpuScheme,
    GpuPool,
    LiveThread,
    UsbThread,
    PlaybackManager,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::CpuScheme => write!(f, "cpu scheme"),
            ServiceKind::GpuPool => write!(f, "gpu pool"),
            ServiceKind::LiveThread => write!(f, "live thread"),
            ServiceKind::UsbThread => write!(f, "usb thread"),
            ServiceKind::PlaybackManager => write!(f, "playback manager"),
        }
    }
}

/// Storage the playback manager reads from and records into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackStorage {
    pub dir: PathBuf,
    pub block_size_bytes: u64,
    pub block_count: u64,
    pub epoch: u64,
}

/// Parameters for opening a service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceParams {
    CpuScheme(CpuPlan),
    GpuPool(GpuPoolPlan),
    CaptureThread {
        kind: CaptureKind,
        affinity: Option<usize>,
    },
    PlaybackManager {
        storage: PlaybackStorage,
    },
}

impl ServiceParams {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceParams::CpuScheme(_) => ServiceKind::CpuScheme,
            ServiceParams::GpuPool(_) => ServiceKind::GpuPool,
            ServiceParams::CaptureThread {
                kind: CaptureKind::Live,
                ..
            } => ServiceKind::LiveThread,
            ServiceParams::CaptureThread {
                kind: CaptureKind::Usb,
                ..
            } => ServiceKind::UsbThread,
            ServiceParams::PlaybackManager { .. } => ServiceKind::PlaybackManager,
        }
    }
}

/// What a stream slot is bound to on a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindTarget {
    /// Stream slot is fed by the service (capture thread or playback).
    Source,
    /// Frames of the stream slot are uploaded into the GPU pool.
    Display,
    /// Stream slot is written into block storage of the given epoch.
    Record { epoch: u64 },
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Source => write!(f, "source"),
            BindTarget::Display => write!(f, "display"),
            BindTarget::Record { epoch } => write!(f, "record@{}", epoch),
        }
    }
}

/// Binding of one stream slot on a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub stream_slot: u32,
    /// Camera address, for capture sources.
    pub address: Option<String>,
    pub target: BindTarget,
}

impl BindRequest {
    pub fn source(stream_slot: u32, address: impl Into<String>) -> Self {
        Self {
            stream_slot,
            address: Some(address.into()),
            target: BindTarget::Source,
        }
    }

    pub fn display(stream_slot: u32) -> Self {
        Self {
            stream_slot,
            address: None,
            target: BindTarget::Display,
        }
    }

    pub fn record(stream_slot: u32, epoch: u64) -> Self {
        Self {
            stream_slot,
            address: None,
            target: BindTarget::Record { epoch },
        }
    }
}

/// Errors reported by native services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    #[error("Failed to open {service}: {reason}")]
    OpenFailed { service: ServiceKind, reason: String },

    #[error("Failed to bind stream slot {stream_slot}: {reason}")]
    BindFailed { stream_slot: u32, reason: String },

    #[error("Unknown service handle {0}")]
    UnknownHandle(NativeHandle),

    #[error("Unknown binding {0}")]
    UnknownBinding(BindingId),

    #[error("Failed to close {service} ({handle}): {reason}")]
    CloseFailed {
        service: ServiceKind,
        handle: NativeHandle,
        reason: String,
    },
}

impl NativeError {
    pub fn open_failed(service: ServiceKind, reason: impl Into<String>) -> Self {
        NativeError::OpenFailed {
            service,
            reason: reason.into(),
        }
    }

    pub fn bind_failed(stream_slot: u32, reason: impl Into<String>) -> Self {
        NativeError::BindFailed {
            stream_slot,
            reason: reason.into(),
        }
    }
}

/// Result type for native service calls.
pub type NativeResult<T> = Result<T, NativeError>;

/// Native capture, GPU and storage services.
///
/// Closing is two-phase: `request_close` signals the service's execution
/// context to stop and returns immediately, `wait_close` joins it.
pub trait NativeServices: Send + Sync {
    /// Open a service.
    fn open(&self, params: &ServiceParams) -> NativeResult<NativeHandle>;

    /// Signal a service to stop.
    fn request_close(&self, handle: NativeHandle) -> NativeResult<()>;

    /// Wait for a service to stop and release it.
    fn wait_close(&self, handle: NativeHandle) -> NativeResult<()>;

    /// Bind a stream slot on a service.
    fn bind(&self, handle: NativeHandle, request: &BindRequest) -> NativeResult<BindingId>;

    /// Remove a binding.
    fn unbind(&self, binding: BindingId) -> NativeResult<()>;

    /// Signal then join.
    fn close(&self, handle: NativeHandle) -> NativeResult<()> {
        self.request_close(handle)?;
        self.wait_close(handle)
    }
}
