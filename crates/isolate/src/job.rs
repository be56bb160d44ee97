//! The unit of work handed to [`crate::IsolatedExecutor`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default timeouts applied to jobs that don't set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Wait granted to the first attempt.
    pub timeout: Duration,
    /// Ceiling the doubling wait may reach before the job is abandoned.
    pub max_timeout: Duration,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(80),
        }
    }
}

// ---------------------------------------------------------------------------
// IsolatedJob
// ---------------------------------------------------------------------------

/// A named job plus its positional arguments and timeout policy.
///
/// The name is resolved against the worker's [`crate::JobRegistry`], which is
/// how a "callable" crosses the process boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolatedJob {
    pub name: String,
    pub args: Vec<Value>,
    pub timeout: Duration,
    pub max_timeout: Duration,
}

impl IsolatedJob {
    /// New job with the default [`IsolationConfig`] timeouts and no arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(name, &IsolationConfig::default())
    }

    pub fn from_config(name: impl Into<String>, config: &IsolationConfig) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            timeout: config.timeout,
            max_timeout: config.max_timeout,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    /// JSON encoding of the arguments as passed to the worker.
    pub fn args_json(&self) -> String {
        Value::Array(self.args.clone()).to_string()
    }
}
