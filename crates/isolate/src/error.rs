//! Errors surfaced by the isolated executor.

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while running a job in a worker process.
#[derive(Debug, Error)]
pub enum IsolationError {
    // ------ Fatal outcomes of a run ------

    /// No worker answered, even with the wait raised to the ceiling.
    #[error("timed out too many times while running '{job}', max timeout of {max_timeout:?} reached")]
    TimeoutExceeded {
        job: String,
        max_timeout: Duration,
    },

    /// The job itself failed inside the worker.
    ///
    /// `kind` is a best-effort tag of the original error; the concrete type
    /// does not survive the process boundary.
    #[error("job '{job}' failed in worker ({kind}): {message}")]
    Worker {
        job: String,
        kind: String,
        message: String,
        trace: Option<String>,
    },

    /// The worker closed its result channel without sending an envelope.
    #[error("worker for '{job}' exited without a result ({status:?})")]
    NoEnvelope {
        job: String,
        status: Option<ExitStatus>,
    },

    // ------ Plumbing ------

    #[error("failed to spawn worker for '{job}': {source}")]
    Spawn {
        job: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read result channel of '{job}': {source}")]
    Channel {
        job: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker for '{job}' sent a malformed envelope: {source}")]
    MalformedEnvelope {
        job: String,
        #[source]
        source: serde_json::Error,
    },

    /// The worker succeeded but its value does not fit the requested type.
    #[error("result of '{job}' could not be decoded: {source}")]
    Decode {
        job: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot build worker command: {0}")]
    Launcher(String),
}

impl IsolationError {
    /// Message of the original failure for worker errors, the display text otherwise.
    pub fn message(&self) -> String {
        match self {
            IsolationError::Worker { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
