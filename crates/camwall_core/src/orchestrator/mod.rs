//! Resource orchestrator for the camera wall.
//!
//! Builds the graph of native resources a live wall needs, tears it down in
//! reverse, and swaps it for a new one when configuration changes.
//!
//! # Architecture
//!
//! ```text
//! ResourcePipeline
//!     ├── Step: CpuScheme
//!     ├── Step: GpuPool
//!     ├── Step: Capture   (live + USB threads)
//!     ├── Step: Storage   (load or recreate block storage)
//!     ├── Step: Playback
//!     └── Step: Chains    (live + playback filter chain groups)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use camwall_core::orchestrator::{GraphConfig, Orchestrator, RuntimeContext};
//!
//! let runtime = RuntimeContext::new(native, storage_dir);
//! let mut orchestrator = Orchestrator::new(runtime);
//! let handle = orchestrator.open(GraphConfig::default())?;
//! println!("Storage: {}", orchestrator.graph(handle)?.storage_decision());
//! let report = orchestrator.close()?;
//! ```

mod arena;
mod errors;
mod graph;
mod lifecycle;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use arena::{GenerationalArena, GraphHandle};
pub use errors::{OrchestratorError, OrchestratorResult, StepError, StepResult};
pub use graph::ResourceGraph;
pub use lifecycle::{BusyFlag, Orchestrator, OrchestratorState, ReopenReport};
pub use pipeline::{OpenFailure, OpenRunResult, ResourcePipeline};
pub use step::ResourceStep;
pub use steps::{CaptureStep, ChainsStep, CpuSchemeStep, GpuPoolStep, PlaybackStep, StorageStep};
pub use types::{
    GraphConfig, GraphParts, OpenContext, RuntimeContext, StepOutcome, TeardownFailure,
    TeardownReport,
};

/// Create the standard pipeline with every step in dependency order.
///
/// 1. CpuScheme - core assignment for capture and upload threads
/// 2. GpuPool - frame buffers per resolution class
/// 3. Capture - live and USB capture threads
/// 4. Storage - block storage, reused or recreated
/// 5. Playback - playback manager over the block storage
/// 6. Chains - per-device filter chains and the recording policy
pub fn standard_pipeline() -> ResourcePipeline {
    ResourcePipeline::new()
        .with_step(CpuSchemeStep)
        .with_step(GpuPoolStep)
        .with_step(CaptureStep)
        .with_step(StorageStep)
        .with_step(PlaybackStep)
        .with_step(ChainsStep)
}
