//! Worker result envelope: the one message a worker sends back.
//!
//! Serialized as a single JSON line on the worker's stdout, behind
//! [`ENVELOPE_PREFIX`] so anything else the job prints is told apart:
//!
//! ```text
//! pipeline-envelope:{"status":"ok","value":{...}}
//! pipeline-envelope:{"status":"err","kind":"io","message":"...","trace":"..."}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::IsolationError;

/// Marks the envelope line on the worker's stdout.
pub const ENVELOPE_PREFIX: &str = "pipeline-envelope:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerEnvelope {
    Ok {
        value: Value,
    },
    Err {
        /// Best-effort error kind, e.g. `"io"`, `"panic"`, `"unknown_job"`.
        kind: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trace: Option<String>,
    },
}

impl WorkerEnvelope {
    pub fn err(kind: impl Into<String>, message: impl Into<String>) -> Self {
        WorkerEnvelope::Err {
            kind: kind.into(),
            message: message.into(),
            trace: None,
        }
    }

    /// Build an error envelope from a job failure, keeping the full cause chain as trace.
    pub fn from_error(err: &anyhow::Error) -> Self {
        WorkerEnvelope::Err {
            kind: error_kind(err).to_owned(),
            message: err.to_string(),
            trace: Some(format!("{err:?}")),
        }
    }

    /// Encode as one prefixed, newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{ENVELOPE_PREFIX}{json}\n"))
    }

    /// Decode a line read from a worker. `None` when the line is not an
    /// envelope at all (ordinary job output).
    pub fn from_line(job: &str, line: &str) -> Option<Result<Self, IsolationError>> {
        let json = line.trim_end().strip_prefix(ENVELOPE_PREFIX)?;
        Some(
            serde_json::from_str(json).map_err(|source| IsolationError::MalformedEnvelope {
                job: job.to_owned(),
                source,
            }),
        )
    }

    /// Turn the envelope back into the caller-side outcome.
    pub fn into_result(self, job: &str) -> Result<Value, IsolationError> {
        match self {
            WorkerEnvelope::Ok { value } => Ok(value),
            WorkerEnvelope::Err { kind, message, trace } => Err(IsolationError::Worker {
                job: job.to_owned(),
                kind,
                message,
                trace,
            }),
        }
    }
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    if err.is::<std::io::Error>() {
        "io"
    } else if err.is::<serde_json::Error>() {
        "json"
    } else {
        "error"
    }
}
