//! Resource step trait definition.
//!
//! Every resource in the graph is acquired and released by one step,
//! providing a consistent interface for validation, open and close.

use super::errors::StepResult;
use super::types::{GraphParts, OpenContext, StepOutcome, TeardownFailure};
use crate::native::NativeServices;

/// Trait for resource steps.
///
/// The pipeline calls these methods in order when opening:
///
/// 1. `validate_input` - Check that the resources this step needs are present
/// 2. `open` - Acquire the step's resources and record them in `parts`
///
/// and `close` in reverse step order when tearing down or rolling back.
///
/// # Example
///
/// ```ignore
/// struct GpuPoolStep;
///
/// impl ResourceStep for GpuPoolStep {
///     fn name(&self) -> &str { "GpuPool" }
///
///     fn validate_input(&self, _ctx: &OpenContext, parts: &GraphParts) -> StepResult<()> {
///         if parts.cpu_plan.is_none() {
///             return Err(StepError::precondition_failed("CPU scheme not open"));
///         }
///         Ok(())
///     }
///
///     fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome> {
///         parts.gpu_pool = Some(ctx.native().open(&params)?);
///         Ok(StepOutcome::Success)
///     }
///
///     fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure> {
///         // release parts.gpu_pool ...
///         Vec::new()
///     }
/// }
/// ```
pub trait ResourceStep: Send + Sync {
    /// Get the step name (for logging and error context).
    fn name(&self) -> &str;

    /// Validate that everything this step depends on is open.
    fn validate_input(&self, ctx: &OpenContext, parts: &GraphParts) -> StepResult<()>;

    /// Acquire the step's resources.
    ///
    /// On error the step must leave nothing of its own acquired; the
    /// pipeline only rolls back steps that completed.
    fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> StepResult<StepOutcome>;

    /// Release the step's resources, best-effort.
    ///
    /// Must not stop at the first failure. Returns every failure seen.
    /// Fields already empty are skipped.
    fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> Vec<TeardownFailure>;

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStep {
        name: &'static str,
    }

    impl ResourceStep for MockStep {
        fn name(&self) -> &str {
            self.name
        }

        fn validate_input(&self, _ctx: &OpenContext, _parts: &GraphParts) -> StepResult<()> {
            Ok(())
        }

        fn open(&self, _ctx: &OpenContext, _parts: &mut GraphParts) -> StepResult<StepOutcome> {
            Ok(StepOutcome::Success)
        }

        fn close(&self, _native: &dyn NativeServices, _parts: &mut GraphParts) -> Vec<TeardownFailure> {
            Vec::new()
        }
    }

    #[test]
    fn step_trait_object_works() {
        let step: Box<dyn ResourceStep> = Box::new(MockStep { name: "TestStep" });

        assert_eq!(step.name(), "TestStep");
        assert_eq!(step.description(), "TestStep");
    }
}
