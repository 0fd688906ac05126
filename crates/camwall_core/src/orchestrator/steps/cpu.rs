//! CPU scheme step - plans thread affinity for capture and GPU upload.

use crate::native::{CpuPlan, NativeServices, ServiceParams};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};

use super::close_service;

/// Opens the CPU scheme. With pinning off the scheme carries no affinity.
pub struct CpuSchemeStep;

impl ResourceStep for CpuSchemeStep {
    fn name(&self) -> &str {
        "CpuScheme"
    }

    fn description(&self) -> &str {
        "CPU affinity scheme"
    }

    fn validate_input(&self, _ctx: &OpenContext, _parts: &GraphParts) -> StepResult<()> {
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let plan = CpuPlan::from_memory(&ctx.config.memory);
        let handle = ctx
            .native()
            .open(&ServiceParams::CpuScheme(plan.clone()))
            .map_err(|e| StepError::native("open cpu scheme", e))?;
        tracing::debug!(pinned = plan.is_pinned(), cores = plan.cores, "CPU scheme");
        parts.cpu_scheme = Some(handle);
        parts.cpu_plan = Some(plan);
        Ok(StepOutcome::Success)
    }

    fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        parts.cpu_plan = None;
        close_service(native, "cpu scheme", parts.cpu_scheme.take())
            .into_iter()
            .collect()
    }
}
