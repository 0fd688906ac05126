//! Error types for the resource orchestrator.
//!
//! Errors carry context that chains through layers:
//! Orchestrator → Step → Native call → Detail

use thiserror::Error;

use crate::models::{DeviceSetError, SlotError};
use crate::native::NativeError;
use crate::storage::StorageError;

/// Error from opening or closing one resource step.
#[derive(Error, Debug)]
pub enum StepError {
    /// Block storage could neither be loaded nor created.
    #[error("Block storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    /// A capture thread failed to start.
    #[error("Capture thread failed to start: {0}")]
    CaptureInit(#[source] NativeError),

    /// A native call failed.
    #[error("{operation} failed: {source}")]
    Native {
        operation: String,
        #[source]
        source: NativeError,
    },

    /// A resource this step depends on is not present.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),
}

impl StepError {
    /// Create a native call error with context.
    pub fn native(operation: impl Into<String>, source: NativeError) -> Self {
        Self::Native {
            operation: operation.into(),
            source,
        }
    }

    /// Create a precondition failed error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }
}

/// Top-level error of an orchestrator operation.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    InvalidSlot(SlotError),

    #[error("Corrupt device set: slot {slot} is claimed by devices {first} and {second}")]
    CorruptDeviceSet { slot: u32, first: u64, second: u64 },

    #[error("Block storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    #[error("Capture initialization failed: {0}")]
    CaptureInitError(#[source] NativeError),

    /// Any other resource failed to open.
    #[error("Resource '{step_name}' failed to open: {source}")]
    ResourceInit {
        step_name: String,
        #[source]
        source: StepError,
    },

    /// Handle refers to a graph that has been replaced or closed.
    #[error("Stale graph handle (generation {generation})")]
    StaleHandle { generation: u64 },

    #[error("No resource graph is open")]
    NotOpen,

    #[error("A resource graph is already open")]
    AlreadyOpen,

    /// A previous reconfiguration failed; a manual restart is required.
    #[error("Orchestrator is broken after a failed reconfiguration: {0}")]
    Broken(String),
}

impl OrchestratorError {
    /// Classify a failed step into the public error kinds.
    pub fn from_step(step_name: impl Into<String>, source: StepError) -> Self {
        match source {
            StepError::StorageUnavailable(e) => Self::StorageUnavailable(e),
            StepError::CaptureInit(e) => Self::CaptureInitError(e),
            other => Self::ResourceInit {
                step_name: step_name.into(),
                source: other,
            },
        }
    }
}

impl From<DeviceSetError> for OrchestratorError {
    fn from(err: DeviceSetError) -> Self {
        match err {
            DeviceSetError::InvalidSlot(e) => Self::InvalidSlot(e),
            DeviceSetError::CorruptDeviceSet {
                slot,
                first,
                second,
            } => Self::CorruptDeviceSet {
                slot,
                first,
                second,
            },
        }
    }
}

/// Result type for step operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::ServiceKind;

    #[test]
    fn capture_step_error_maps_to_capture_init() {
        let step = StepError::CaptureInit(NativeError::open_failed(ServiceKind::LiveThread, "boom"));
        let err = OrchestratorError::from_step("Capture", step);
        assert!(matches!(err, OrchestratorError::CaptureInitError(_)));
    }

    #[test]
    fn other_step_errors_keep_step_name() {
        let step = StepError::native(
            "open gpu pool",
            NativeError::open_failed(ServiceKind::GpuPool, "out of memory"),
        );
        let err = OrchestratorError::from_step("GpuPool", step);
        let msg = err.to_string();
        assert!(msg.contains("GpuPool"));
        assert!(msg.contains("out of memory"));
    }

    #[test]
    fn device_set_errors_convert() {
        let err: OrchestratorError = DeviceSetError::CorruptDeviceSet {
            slot: 5,
            first: 1,
            second: 2,
        }
        .into();
        assert!(matches!(err, OrchestratorError::CorruptDeviceSet { slot: 5, .. }));
    }
}
