//! How a worker process gets started.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::{IsolatedJob, IsolationError};

/// Builds the command for one worker attempt.
///
/// Called once per attempt, so every retry gets a brand-new process. The
/// executor takes care of piping stdout and of kill-on-drop; implementations
/// only describe *what* to run.
pub trait WorkerLauncher: Send + Sync {
    fn command(&self, job: &IsolatedJob) -> Result<Command, IsolationError>;
}

/// Re-executes a binary that routes `worker <job> --args <json>` into
/// [`crate::worker::serve`].
#[derive(Debug, Clone)]
pub struct SelfExecLauncher {
    program: PathBuf,
    subcommand: Vec<String>,
}

impl SelfExecLauncher {
    /// Launch workers through the currently running executable.
    pub fn current_exe() -> Result<Self, IsolationError> {
        let program = std::env::current_exe().map_err(|e| {
            IsolationError::Launcher(format!("cannot determine current executable: {e}"))
        })?;
        Ok(Self::new(program))
    }

    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            subcommand: vec!["worker".to_owned()],
        }
    }

    /// Replace the `worker` sub-command path (e.g. `["internal", "worker"]`).
    pub fn with_subcommand(mut self, subcommand: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subcommand = subcommand.into_iter().map(Into::into).collect();
        self
    }
}

impl WorkerLauncher for SelfExecLauncher {
    fn command(&self, job: &IsolatedJob) -> Result<Command, IsolationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.subcommand)
            .arg(&job.name)
            .arg("--args")
            .arg(job.args_json())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        Ok(command)
    }
}
