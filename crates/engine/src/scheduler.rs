//! Stage scheduler.
//!
//! `StageScheduler::execute` drives a [`Plan`] to completion:
//! 1. Takes stages in order; a single step is a group of one.
//! 2. Launches every step of the stage as its own task and waits for all of
//!    them before moving on (a stage is a barrier).
//! 3. Appends the stage's results in declared order, not completion order.
//! 4. Once the trace holds a failure, stops launching work and skips every
//!    remaining step instead.

use std::sync::Arc;

use steps::{StepResult, StepStatus};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, instrument, warn};

use crate::plan::{Invocation, Plan, Stage};
use crate::ExecutionTrace;

// ---------------------------------------------------------------------------
// StageScheduler
// ---------------------------------------------------------------------------

/// Stateless orchestrator; every `execute` call owns its own trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageScheduler;

impl StageScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Run `plan` and return one result per step, in plan order.
    ///
    /// Never fails: step failures, and panics escaping a step, are recorded
    /// as `Failure` results in the trace.
    #[instrument(skip_all, fields(stages = plan.stages().len(), steps = plan.step_count()))]
    pub async fn execute(&self, plan: &Plan) -> ExecutionTrace {
        let mut trace = ExecutionTrace::new();
        let stages = plan.stages();

        for (index, stage) in stages.iter().enumerate() {
            if let Some(failed) = trace.first_failure() {
                warn!(
                    "step '{}' failed, skipping the remaining {} stage(s)",
                    failed.step_id(),
                    stages.len() - index
                );
                trace.extend(skip_remaining(&stages[index..]));
                break;
            }

            let results = run_stage(index, stage).await;
            trace.extend(results);
        }

        info!("plan finished: {:?}", trace.counts());
        trace
    }
}

// ---------------------------------------------------------------------------
// Internal: one stage
// ---------------------------------------------------------------------------

/// Handles of a stage's running steps. Aborts whatever is still running if
/// the stage is dropped before its barrier completes.
struct StageTasks {
    handles: Vec<JoinHandle<StepResult>>,
}

impl Drop for StageTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_stage(index: usize, stage: &Stage) -> Vec<StepResult> {
    let invocations = stage.invocations();
    info!("stage {}: launching {} step(s)", index, invocations.len());

    let mut tasks = StageTasks {
        handles: invocations
            .iter()
            .map(|invocation| {
                let step = Arc::clone(&invocation.step);
                let args = invocation.args.clone();
                tokio::spawn(async move { step.run(&args).await })
            })
            .collect(),
    };

    let mut results = Vec::with_capacity(invocations.len());
    for (invocation, handle) in invocations.iter().zip(tasks.handles.iter_mut()) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => escaped_fault(invocation, e),
        };

        match result.status() {
            StepStatus::Failure => error!(
                "step '{}' failed: {}",
                result.step_id(),
                result.error().unwrap_or("no diagnostic")
            ),
            status => info!("step '{}' finished: {}", result.step_id(), status),
        }
        results.push(result);
    }

    results
}

fn skip_remaining(stages: &[Stage]) -> impl Iterator<Item = StepResult> + '_ {
    stages
        .iter()
        .flat_map(Stage::invocations)
        .map(|invocation| invocation.step.skip())
}

/// A step's task ended without producing a result (it panicked or was
/// cancelled); record that as the step's failure.
fn escaped_fault(invocation: &Invocation, e: JoinError) -> StepResult {
    let message = if e.is_panic() {
        let payload = e.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        format!("step panicked: {detail}")
    } else {
        "step task was cancelled".to_owned()
    };
    StepResult::failure(invocation.step_id(), message, serde_json::Value::Null)
}
