//! Compute backend abstraction
//!
//! A backend runs every stage of a plan in order, feeding each stage's
//! outputs into the next stage's wired inputs, and returns the words of the
//! final stage's first output.

use crate::plan::ExecutionPlan;
use anyhow::Result;

#[allow(async_fn_in_trait)]
pub trait ComputeBackend {
    /// Human-readable name for logging
    fn name(&self) -> String;

    /// Execute the plan. `Ok(None)` means the run produced no data.
    async fn execute(&self, plan: &ExecutionPlan) -> Result<Option<Vec<u32>>>;
}
