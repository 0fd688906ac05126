//! Capture step - starts the live (RTSP) and USB capture threads.

use crate::models::CaptureKind;
use crate::native::{NativeHandle, NativeServices, ServiceParams};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};

use super::close_service;

/// Starts both capture threads. Either failing is a capture init error,
/// and a thread already started by this step is stopped again.
pub struct CaptureStep;

impl CaptureStep {
    fn start(
        ctx: &OpenContext,
        kind: CaptureKind,
        affinity: Option<usize>,
    ) -> StepResult<NativeHandle> {
        ctx.native()
            .open(&ServiceParams::CaptureThread { kind, affinity })
            .map_err(StepError::CaptureInit)
    }
}

impl ResourceStep for CaptureStep {
    fn name(&self) -> &str {
        "Capture"
    }

    fn description(&self) -> &str {
        "Capture threads"
    }

    fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
        if parts.gpu_pool.is_none() {
            return Err(StepError::precondition_failed("GPU pool not open"));
        }
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let (live_core, usb_core) = parts
            .cpu_plan
            .as_ref()
            .map_or((None, None), |plan| (plan.live, plan.usb));

        let live = Self::start(ctx, CaptureKind::Live, live_core)?;
        let usb = match Self::start(ctx, CaptureKind::Usb, usb_core) {
            Ok(usb) => usb,
            Err(e) => {
                if let Some(failure) = close_service(ctx.native(), "live thread", Some(live)) {
                    tracing::warn!("{}", failure);
                }
                return Err(e);
            }
        };

        parts.live_thread = Some(live);
        parts.usb_thread = Some(usb);
        Ok(StepOutcome::Success)
    }

    fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        let threads = [
            ("usb thread", parts.usb_thread.take()),
            ("live thread", parts.live_thread.take()),
        ];
        let mut failures = Vec::new();

        // Signal both before joining either
        for (name, handle) in &threads {
            if let Some(handle) = handle {
                if let Err(e) = native.request_close(*handle) {
                    failures.push(TeardownFailure::new(*name, e));
                }
            }
        }
        for (name, handle) in &threads {
            if let Some(handle) = handle {
                if let Err(e) = native.wait_close(*handle) {
                    failures.push(TeardownFailure::new(*name, e));
                }
            }
        }
        failures
    }
}
