//! Resource pipeline: opens steps in dependency order, closes them in reverse.

use super::errors::StepError;
use super::step::ResourceStep;
use super::types::{GraphParts, OpenContext, StepOutcome, TeardownReport};
use crate::native::NativeServices;

/// A step failed while opening. Earlier steps have been rolled back.
#[derive(Debug)]
pub struct OpenFailure {
    pub step_name: String,
    pub source: StepError,
    /// Result of rolling back the steps that had completed.
    pub rollback: TeardownReport,
}

/// Pipeline that acquires a sequence of resources.
///
/// Opening runs each step's validation and open in order and aborts at the
/// first failure, releasing whatever the completed steps acquired. Closing
/// visits every step in reverse order and never stops early.
pub struct ResourcePipeline {
    /// Steps in dependency order.
    steps: Vec<Box<dyn ResourceStep>>,
}

impl ResourcePipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step to the pipeline.
    pub fn add_step<S: ResourceStep + 'static>(&mut self, step: S) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: ResourceStep + 'static>(mut self, step: S) -> Self {
        self.add_step(step);
        self
    }

    /// Open every step in order.
    ///
    /// Returns the names of completed and skipped steps, or the failure
    /// together with the rollback report.
    pub fn open(&self, ctx: &OpenContext, parts: &mut GraphParts) -> Result<OpenRunResult, OpenFailure> {
        let mut result = OpenRunResult::default();

        for (i, step) in self.steps.iter().enumerate() {
            let step_name = step.name();
            tracing::debug!(step = step_name, "Opening");

            let outcome = step
                .validate_input(ctx, parts)
                .and_then(|()| step.open(ctx, parts));

            match outcome {
                Ok(StepOutcome::Success) => {
                    tracing::info!(step = step_name, "{} ready", step.description());
                    result.steps_completed.push(step_name.to_string());
                }
                Ok(StepOutcome::Skipped(reason)) => {
                    tracing::info!(step = step_name, "{} skipped: {}", step_name, reason);
                    result.steps_skipped.push(step_name.to_string());
                }
                Err(source) => {
                    tracing::error!(step = step_name, "Open failed: {}", source);
                    let rollback = self.close_range(ctx.native(), parts, i);
                    return Err(OpenFailure {
                        step_name: step_name.to_string(),
                        source,
                        rollback,
                    });
                }
            }
        }

        Ok(result)
    }

    /// Close every step in reverse order, best-effort.
    pub fn close(&self, native: &dyn NativeServices, parts: &mut GraphParts) -> TeardownReport {
        self.close_range(native, parts, self.steps.len())
    }

    /// Close steps `0..end` in reverse.
    fn close_range(
        &self,
        native: &dyn NativeServices,
        parts: &mut GraphParts,
        end: usize,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();
        for step in self.steps[..end].iter().rev() {
            let failures = step.close(native, parts);
            for failure in &failures {
                tracing::warn!(step = step.name(), resource = %failure.resource, "Teardown failed: {}", failure.message);
            }
            report.failures.extend(failures);
            report.steps_closed.push(step.name().to_string());
        }
        report
    }

    /// Get the number of steps in the pipeline.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

impl Default for ResourcePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful open.
#[derive(Debug, Clone, Default)]
pub struct OpenRunResult {
    /// Steps that acquired their resources.
    pub steps_completed: Vec<String>,
    /// Steps that were skipped.
    pub steps_skipped: Vec<String>,
}

impl OpenRunResult {
    /// Total number of steps that ran.
    pub fn total_steps(&self) -> usize {
        self.steps_completed.len() + self.steps_skipped.len()
    }
}
