//! Isolated job execution.
//!
//! `IsolatedExecutor::run_isolated` drives one job to completion:
//! 1. Spawns a fresh worker and waits on its stdout for one envelope, for at
//!    most `min(current timeout, max_timeout)`.
//! 2. Kills the worker's process group and reaps the worker whatever the
//!    outcome of the wait.
//! 3. On a timed-out wait, gives up with `TimeoutExceeded` once the current
//!    timeout has reached the ceiling, otherwise doubles it and starts over
//!    with a new worker.
//! 4. Returns the worker's value, or re-raises its error as
//!    [`IsolationError::Worker`].

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, error, info, instrument, warn};

use crate::{IsolatedJob, IsolationError, WorkerEnvelope, WorkerLauncher};

/// Smallest timeout the doubling starts from.
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Outcome of a single attempt
// ---------------------------------------------------------------------------

enum Attempt {
    Answered(WorkerEnvelope),
    TimedOut,
    Closed,
}

// ---------------------------------------------------------------------------
// IsolatedExecutor
// ---------------------------------------------------------------------------

/// Runs jobs in separate worker processes with a doubling timeout.
#[derive(Clone)]
pub struct IsolatedExecutor {
    launcher: Arc<dyn WorkerLauncher>,
}

impl IsolatedExecutor {
    pub fn new(launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self { launcher }
    }

    /// Run `job` and decode the worker's value into `T`.
    ///
    /// # Errors
    /// - [`IsolationError::TimeoutExceeded`] when no attempt answered in time.
    /// - [`IsolationError::Worker`] when the job failed inside the worker.
    /// - Spawn, channel and decoding errors for the plumbing in between.
    pub async fn run_isolated<T: DeserializeOwned>(
        &self,
        job: &IsolatedJob,
    ) -> Result<T, IsolationError> {
        let value = self.run_isolated_value(job).await?;
        serde_json::from_value(value).map_err(|source| IsolationError::Decode {
            job: job.name.clone(),
            source,
        })
    }

    /// Like [`run_isolated`](Self::run_isolated) but returns the raw JSON value.
    #[instrument(skip(self, job), fields(job = %job.name))]
    pub async fn run_isolated_value(&self, job: &IsolatedJob) -> Result<Value, IsolationError> {
        let mut timeout = job.timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let wait = timeout.min(job.max_timeout);

            let mut child = self.spawn(job)?;
            let outcome = wait_for_envelope(&mut child, &job.name, wait).await;
            terminate(&mut child, &job.name).await;

            match outcome? {
                Attempt::Answered(envelope) => {
                    if let WorkerEnvelope::Err { kind, message, trace } = &envelope {
                        error!(
                            "job '{}' failed in worker ({}): {}\n{}",
                            job.name,
                            kind,
                            message,
                            trace.as_deref().unwrap_or_default()
                        );
                    }
                    return envelope.into_result(&job.name);
                }
                Attempt::Closed => {
                    return Err(IsolationError::NoEnvelope {
                        job: job.name.clone(),
                        status: child.try_wait().ok().flatten(),
                    });
                }
                Attempt::TimedOut => {
                    if timeout >= job.max_timeout {
                        return Err(IsolationError::TimeoutExceeded {
                            job: job.name.clone(),
                            max_timeout: job.max_timeout,
                        });
                    }
                    info!(
                        "timed out while running '{}' after {:?} (attempt {}), retrying",
                        job.name, wait, attempt
                    );
                    timeout = double(timeout);
                }
            }
        }
    }

    fn spawn(&self, job: &IsolatedJob) -> Result<Child, IsolationError> {
        let mut command = self.launcher.command(job)?;
        command.stdout(Stdio::piped()).kill_on_drop(true);
        #[cfg(unix)]
        {
            command.process_group(0);
        }
        command.spawn().map_err(|source| IsolationError::Spawn {
            job: job.name.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Read the worker's stdout until the envelope line shows up. Other lines
/// are job output and only logged.
async fn wait_for_envelope(
    child: &mut Child,
    job: &str,
    wait: Duration,
) -> Result<Attempt, IsolationError> {
    let Some(stdout) = child.stdout.take() else {
        return Err(IsolationError::Launcher("worker stdout is not piped".to_owned()));
    };
    let mut lines = BufReader::new(stdout).lines();

    let read = async {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(Attempt::Closed),
                Err(source) => {
                    return Err(IsolationError::Channel {
                        job: job.to_owned(),
                        source,
                    })
                }
            };
            match WorkerEnvelope::from_line(job, &line) {
                Some(envelope) => return envelope.map(Attempt::Answered),
                None => debug!("'{}' worker output: {}", job, line),
            }
        }
    };

    match tokio::time::timeout(wait, read).await {
        Ok(attempt) => attempt,
        Err(_elapsed) => Ok(Attempt::TimedOut),
    }
}

/// Kill the worker's whole process group, then kill and reap the worker
/// itself. Failures are logged, never raised.
async fn terminate(child: &mut Child, job: &str) {
    if let Some(pid) = child.id() {
        kill_process_group(pid, job);
    }
    if let Err(e) = child.kill().await {
        warn!("'{}' worker process unterminated, error: {}", job, e);
    }
}

/// The worker leads its own group (see `spawn`), so this also reaches
/// anything the job started.
#[cfg(unix)]
fn kill_process_group(pid: u32, job: &str) {
    // SAFETY: killpg only sends a signal; no memory is touched.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            warn!("'{}' worker process group unterminated, error: {}", job, e);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32, _job: &str) {}

/// Next timeout. A zero timeout still grows, so the ceiling is always reached.
fn double(timeout: Duration) -> Duration {
    timeout.max(MIN_TIMEOUT).saturating_mul(2)
}
