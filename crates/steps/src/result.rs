//! Outcome records produced by steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::StepError;

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

impl StepStatus {
    pub fn is_failure(self) -> bool {
        self == StepStatus::Failure
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepStatus::Success => "SUCCESS",
            StepStatus::Failure => "FAILURE",
            StepStatus::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// StepResult
// ---------------------------------------------------------------------------

/// What one step produced during one plan execution.
///
/// Created once, either by running or by skipping the step, and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    step_id: String,
    status: StepStatus,
    #[serde(default)]
    output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    finished_at: DateTime<Utc>,
}

impl StepResult {
    fn new(step_id: impl Into<String>, status: StepStatus, output: Value, error: Option<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status,
            output,
            error,
            finished_at: Utc::now(),
        }
    }

    pub fn success(step_id: impl Into<String>, output: Value) -> Self {
        Self::new(step_id, StepStatus::Success, output, None)
    }

    pub fn failure(step_id: impl Into<String>, message: impl Into<String>, output: Value) -> Self {
        Self::new(step_id, StepStatus::Failure, output, Some(message.into()))
    }

    pub fn skipped(step_id: impl Into<String>) -> Self {
        Self::new(step_id, StepStatus::Skipped, Value::Null, None)
    }

    /// Fold a step body's outcome into a result: `Ok` is a success, any
    /// [`StepError`] a failure carrying the error text.
    pub fn from_outcome(step_id: impl Into<String>, outcome: Result<Value, StepError>) -> Self {
        match outcome {
            Ok(output) => Self::success(step_id, output),
            Err(e) => Self::failure(step_id, e.to_string(), Value::Null),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn output(&self) -> &Value {
        &self.output
    }

    /// Diagnostic message for failures.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}
