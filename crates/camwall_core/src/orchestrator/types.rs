//! Core types for the resource orchestrator.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::chains::FilterChainGroup;
use crate::config::{MemoryConfig, StorageConfig};
use crate::models::Device;
use crate::native::{CpuPlan, NativeHandle, NativeServices};
use crate::storage::{Decision, StorageHandle};

/// Process-wide collaborators the orchestrator works with.
///
/// Passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct RuntimeContext {
    pub native: Arc<dyn NativeServices>,
    /// Directory of the block storage descriptor and data.
    pub storage_dir: PathBuf,
}

impl RuntimeContext {
    pub fn new(native: Arc<dyn NativeServices>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            native,
            storage_dir: storage_dir.into(),
        }
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("storage_dir", &self.storage_dir)
            .finish_non_exhaustive()
    }
}

/// Configuration one graph is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    pub memory: MemoryConfig,
    pub storage: StorageConfig,
    /// Device rows. Slots without a row are treated as Empty.
    pub devices: Vec<Device>,
}

/// Read-only context passed to resource steps.
pub struct OpenContext<'a> {
    pub runtime: &'a RuntimeContext,
    pub config: &'a GraphConfig,
}

impl<'a> OpenContext<'a> {
    pub fn new(runtime: &'a RuntimeContext, config: &'a GraphConfig) -> Self {
        Self { runtime, config }
    }

    pub fn native(&self) -> &dyn NativeServices {
        self.runtime.native.as_ref()
    }
}

/// Resources acquired so far while opening, or left to release while closing.
///
/// Each step fills its own fields on open and empties them on close.
#[derive(Debug, Default)]
pub struct GraphParts {
    pub cpu_scheme: Option<NativeHandle>,
    pub cpu_plan: Option<CpuPlan>,
    pub gpu_pool: Option<NativeHandle>,
    pub live_thread: Option<NativeHandle>,
    pub usb_thread: Option<NativeHandle>,
    pub storage: Option<StorageHandle>,
    pub storage_decision: Option<Decision>,
    pub playback_manager: Option<NativeHandle>,
    pub live_chains: Option<FilterChainGroup>,
    pub playback_chains: Option<FilterChainGroup>,
}

impl GraphParts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nothing is held.
    pub fn is_empty(&self) -> bool {
        self.cpu_scheme.is_none()
            && self.gpu_pool.is_none()
            && self.live_thread.is_none()
            && self.usb_thread.is_none()
            && self.storage.is_none()
            && self.playback_manager.is_none()
            && self.live_chains.is_none()
            && self.playback_chains.is_none()
    }
}

/// Outcome of opening one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step acquired its resources.
    Success,
    /// Step had nothing to do (with reason).
    Skipped(String),
}

/// One resource that failed to release cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub resource: String,
    pub message: String,
}

impl TeardownFailure {
    pub fn new(resource: impl Into<String>, message: impl ToString) -> Self {
        Self {
            resource: resource.into(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

/// What happened while closing a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Steps closed, in the order they were closed.
    pub steps_closed: Vec<String>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
