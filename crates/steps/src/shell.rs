//! `ShellStep` — run a shell command as a pipeline step.
//!
//! The command runs as `sh -c <command> <step-id> <args…>`, so positional
//! run arguments are available as `$1`, `$2`, … Exit status 0 is a success,
//! anything else a failure. With isolation configured the command is handed
//! to the `shell` worker job instead, which gives it a hard, retried timeout.

use std::process::Output;

use async_trait::async_trait;
use isolate::{IsolatedExecutor, IsolatedJob, IsolationConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::jobs::SHELL_JOB;
use crate::{Step, StepError, StepResult};

/// Captured result of one command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for ShellOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl ShellOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Render run arguments as shell words: strings verbatim, everything else as JSON.
pub fn shell_words(args: &[Value]) -> Vec<String> {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

struct Isolation {
    executor: IsolatedExecutor,
    config: IsolationConfig,
}

pub struct ShellStep {
    id: String,
    command: String,
    isolation: Option<Isolation>,
}

impl ShellStep {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            isolation: None,
        }
    }

    /// Run the command through `executor` with the given timeouts.
    pub fn isolated(mut self, executor: IsolatedExecutor, config: IsolationConfig) -> Self {
        self.isolation = Some(Isolation { executor, config });
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn is_isolated(&self) -> bool {
        self.isolation.is_some()
    }

    async fn run_inline(&self, args: &[Value]) -> Result<ShellOutput, StepError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .arg(&self.id)
            .args(shell_words(args))
            .output()
            .await?;
        Ok(output.into())
    }

    async fn run_in_worker(
        &self,
        isolation: &Isolation,
        args: &[Value],
    ) -> Result<ShellOutput, StepError> {
        let job = IsolatedJob::from_config(SHELL_JOB, &isolation.config)
            .arg(self.command.as_str())
            .arg(self.id.as_str())
            .arg(Value::Array(args.to_vec()));
        Ok(isolation.executor.run_isolated(&job).await?)
    }
}

#[async_trait]
impl Step for ShellStep {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, args: &[Value]) -> StepResult {
        debug!("step '{}' running `{}`", self.id, self.command);

        let outcome = match &self.isolation {
            Some(isolation) => self.run_in_worker(isolation, args).await,
            None => self.run_inline(args).await,
        };

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                warn!("step '{}' could not complete: {}", self.id, e);
                return StepResult::from_outcome(&self.id, Err(e));
            }
        };

        let payload = json!(output);
        if output.succeeded() {
            StepResult::success(&self.id, payload)
        } else {
            let status = output
                .exit_code
                .map_or_else(|| "a signal".to_owned(), |code| format!("status {code}"));
            StepResult::failure(&self.id, format!("command exited with {status}"), payload)
        }
    }
}
