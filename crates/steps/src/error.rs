//! Step-level error type.

use isolate::IsolationError;
use thiserror::Error;

/// Errors a step body may hit while running.
///
/// These never escape [`crate::Step::run`]: they are folded into a
/// `Failure` [`crate::StepResult`] by [`crate::StepResult::from_outcome`].
#[derive(Debug, Error)]
pub enum StepError {
    /// The step ran and decided it failed.
    #[error("{0}")]
    Failed(String),

    /// Work delegated to an isolated worker did not complete.
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
