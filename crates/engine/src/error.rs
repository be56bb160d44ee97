//! Engine-level error types.

use thiserror::Error;

/// Errors produced while building a plan.
///
/// Execution itself never fails: step failures are data in the trace.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Two steps in the same plan share an id.
    #[error("duplicate step ID: '{0}'")]
    DuplicateStepId(String),

    /// A concurrent group with no steps in it.
    #[error("stage {stage} is an empty group")]
    EmptyGroup { stage: usize },

    /// A pipeline file could not be parsed.
    #[error("invalid pipeline definition: {0}")]
    Definition(#[from] serde_json::Error),
}
