//! Playback step - opens the manager that reads and records block storage.

use crate::native::{NativeServices, ServiceParams};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};

use super::close_service;

pub struct PlaybackStep;

impl ResourceStep for PlaybackStep {
    fn name(&self) -> &str {
        "Playback"
    }

    fn description(&self) -> &str {
        "Playback manager"
    }

    fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
        if parts.storage.is_none() {
            return Err(StepError::precondition_failed("block storage not open"));
        }
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let storage = parts
            .storage
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("block storage not open"))?
            .playback_storage();
        let handle = ctx
            .native()
            .open(&ServiceParams::PlaybackManager { storage })
            .map_err(|e| StepError::native("open playback manager", e))?;
        parts.playback_manager = Some(handle);
        Ok(StepOutcome::Success)
    }

    fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        close_service(native, "playback manager", parts.playback_manager.take())
            .into_iter()
            .collect()
    }
}
