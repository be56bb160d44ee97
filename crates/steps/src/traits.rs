//! The `Step` trait, the contract every pipeline step must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::StepResult;

/// A unit of pipeline work.
///
/// Implementations decide their own status: expected failures are reported
/// as a `Failure` result, never as a panic or an escaped error.
#[async_trait]
pub trait Step: Send + Sync {
    /// Human-readable identifier, unique within a plan.
    fn id(&self) -> &str;

    /// Run the step with its positional arguments.
    async fn run(&self, args: &[Value]) -> StepResult;

    /// Produce a `Skipped` result without doing any work.
    fn skip(&self) -> StepResult {
        StepResult::skipped(self.id())
    }
}
