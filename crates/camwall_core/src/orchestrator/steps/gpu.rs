//! GPU pool step - preallocates frame buffers per resolution class.

use crate::native::{GpuPoolPlan, NativeServices, ServiceParams};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};

use super::close_service;

/// Opens the GPU buffer pool sized from the memory config.
pub struct GpuPoolStep;

impl ResourceStep for GpuPoolStep {
    fn name(&self) -> &str {
        "GpuPool"
    }

    fn description(&self) -> &str {
        "GPU buffer pool"
    }

    fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
        if parts.cpu_plan.is_none() {
            return Err(StepError::precondition_failed("CPU scheme not open"));
        }
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let cpu = parts
            .cpu_plan
            .as_ref()
            .ok_or_else(|| StepError::precondition_failed("CPU scheme not open"))?;
        let plan = GpuPoolPlan::from_memory(&ctx.config.memory, cpu);
        let frames = plan.total_frames();
        let handle = ctx
            .native()
            .open(&ServiceParams::GpuPool(plan))
            .map_err(|e| StepError::native("open gpu pool", e))?;
        tracing::debug!(frames, msbuftime = ctx.config.memory.msbuftime, "GPU pool");
        parts.gpu_pool = Some(handle);
        Ok(StepOutcome::Success)
    }

    fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        close_service(native, "gpu pool", parts.gpu_pool.take())
            .into_iter()
            .collect()
    }
}
