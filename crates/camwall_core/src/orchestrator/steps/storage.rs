//! Storage step - loads or recreates block storage.

use crate::native::NativeServices;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};
use crate::storage::{Decision, StorageGeometryManager};

/// Opens block storage, reusing it when the geometry is unchanged.
///
/// A recreate destroys every earlier recording. The decision is kept in
/// the graph so the caller can write the effective geometry back.
pub struct StorageStep;

impl ResourceStep for StorageStep {
    fn name(&self) -> &str {
        "Storage"
    }

    fn description(&self) -> &str {
        "Block storage"
    }

    fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
        if parts.live_thread.is_none() || parts.usb_thread.is_none() {
            return Err(StepError::precondition_failed("capture threads not running"));
        }
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let manager = StorageGeometryManager::new(&ctx.runtime.storage_dir);
        let (handle, decision) = manager
            .open(&ctx.config.storage)
            .map_err(StepError::StorageUnavailable)?;

        if decision == Decision::Recreate {
            tracing::warn!(
                dir = %manager.dir().display(),
                "Block storage recreated; recordings made before this point are lost"
            );
        }

        parts.storage = Some(handle);
        parts.storage_decision = Some(decision);
        Ok(StepOutcome::Success)
    }

    fn close(&self, _native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        // Storage holds no native resources; dropping the handle releases it
        if let Some(handle) = parts.storage.take() {
            tracing::debug!(epoch = handle.epoch(), "Block storage released");
        }
        parts.storage_decision = None;
        Vec::new()
    }
}
