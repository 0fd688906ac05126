//! Chains step - builds the live and playback chain groups.

use std::sync::Arc;

use crate::chains::{FilterChainGroup, LiveTargets, PlaybackTargets, RecordSink};
use crate::native::NativeServices;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::ResourceStep;
use crate::orchestrator::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};

/// Reads the devices into both chain groups and applies the recording policy.
///
/// Individual chains that fail to bind do not fail the step.
pub struct ChainsStep;

impl ResourceStep for ChainsStep {
    fn name(&self) -> &str {
        "Chains"
    }

    fn description(&self) -> &str {
        "Filter chain groups"
    }

    fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
        if parts.playback_manager.is_none() {
            return Err(StepError::precondition_failed("playback manager not open"));
        }
        Ok(())
    }

    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
        let missing = || StepError::precondition_failed("upstream resources not open");
        let gpu_pool = parts.gpu_pool.ok_or_else(missing)?;
        let manager = parts.playback_manager.ok_or_else(missing)?;
        let live_targets = LiveTargets {
            live_thread: parts.live_thread.ok_or_else(missing)?,
            usb_thread: parts.usb_thread.ok_or_else(missing)?,
            gpu_pool,
        };
        let epoch = parts.storage.as_ref().ok_or_else(missing)?.epoch();
        let native: Arc<dyn NativeServices> = Arc::clone(&ctx.runtime.native);

        let mut live = FilterChainGroup::live(Arc::clone(&native), live_targets);
        let report = live.read(&ctx.config.devices);
        live.set_recording(
            ctx.config.storage.recording_mode(),
            Some(RecordSink { manager, epoch }),
        );

        let mut playback = FilterChainGroup::playback(native, PlaybackTargets { manager, gpu_pool });
        playback.read(&ctx.config.devices);

        tracing::info!(
            chains = live.len(),
            failed = report.failed,
            recording = %live.recording_mode(),
            "Chain groups bound"
        );

        parts.live_chains = Some(live);
        parts.playback_chains = Some(playback);
        Ok(StepOutcome::Success)
    }

    fn close(&self, _native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();
        for (name, group) in [
            ("live chains", parts.live_chains.take()),
            ("playback chains", parts.playback_chains.take()),
        ] {
            if let Some(mut group) = group {
                failures.extend(
                    group
                        .close()
                        .into_iter()
                        .map(|e| TeardownFailure::new(name, e)),
                );
            }
        }
        failures
    }
}
