//! Worker-side jobs shipped with the built-in steps.

use std::process::Command;

use anyhow::{bail, Context};
use isolate::JobRegistry;
use serde_json::Value;

use crate::shell::{shell_words, ShellOutput};

/// Job name used by isolated [`crate::ShellStep`]s.
pub const SHELL_JOB: &str = "shell";

/// Registry of every job a worker binary needs to host the built-in steps.
pub fn builtin_jobs() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(SHELL_JOB, shell_job);
    registry
}

/// `shell` job: `[command, step_id, [args…]]` → [`ShellOutput`].
fn shell_job(args: Vec<Value>) -> anyhow::Result<Value> {
    let [command, step_id, run_args] = args.as_slice() else {
        bail!("shell job expects [command, step_id, args], got {} values", args.len());
    };
    let command = command.as_str().context("shell command must be a string")?;
    let step_id = step_id.as_str().context("step id must be a string")?;
    let run_args = run_args.as_array().map(Vec::as_slice).unwrap_or_default();

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .arg(step_id)
        .args(shell_words(run_args))
        .output()
        .with_context(|| format!("failed to spawn `sh` for step '{step_id}'"))?;

    Ok(serde_json::to_value(ShellOutput::from(output))?)
}
