//! Resource step implementations.
//!
//! One step per resource, listed here in dependency order.

mod capture;
mod chains;
mod cpu;
mod gpu;
mod playback;
mod storage;

pub use capture::CaptureStep;
pub use chains::ChainsStep;
pub use cpu::CpuSchemeStep;
pub use gpu::GpuPoolStep;
pub use playback::PlaybackStep;
pub use storage::StorageStep;

use crate::native::{NativeHandle, NativeServices};
use crate::orchestrator::types::TeardownFailure;

/// Signal-then-join one service. Returns the failure, if any.
fn close_service(
    native: &dyn NativeServices,
    resource: &str,
    handle: Option<NativeHandle>,
) -> Option<TeardownFailure> {
    let handle = handle?;
    native
        .close(handle)
        .err()
        .map(|e| TeardownFailure::new(resource, e))
}
