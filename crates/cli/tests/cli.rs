//! End-to-end tests against the built `pipeline-runner` binary.
//!
//! The binary doubles as the worker for isolated steps, so these tests cover
//! the real self-exec path.

#![cfg(unix)]

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use isolate::{IsolatedExecutor, IsolatedJob, IsolationError, SelfExecLauncher};
use serde_json::{json, Value};
use steps::ShellOutput;

const BIN: &str = env!("CARGO_BIN_EXE_pipeline-runner");

fn executor() -> IsolatedExecutor {
    IsolatedExecutor::new(Arc::new(SelfExecLauncher::new(BIN)))
}

fn tmp_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name)
}

/// Running and not a zombie, per `/proc`.
#[cfg(target_os = "linux")]
fn is_running(pid: &str) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .map(|stat| {
            !stat
                .rsplit_once(')')
                .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

fn write_pipeline(name: &str, content: &Value) -> PathBuf {
    let path = tmp_path(&format!("{name}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(content).unwrap()).unwrap();
    path
}

// ============================================================
// Worker sub-command through IsolatedExecutor
// ============================================================

#[tokio::test]
async fn shell_job_runs_in_worker_process() {
    let job = IsolatedJob::new("shell")
        .arg("echo \"hi from $0\"")
        .arg("sample")
        .arg(json!([]))
        .timeout(Duration::from_secs(10));

    let output: ShellOutput = executor().run_isolated(&job).await.expect("worker answers");

    assert!(output.succeeded());
    assert_eq!(output.stdout, "hi from sample\n");
}

#[tokio::test]
async fn hanging_worker_times_out() {
    let job = IsolatedJob::new("shell")
        .arg("sleep 5")
        .arg("sleepy")
        .arg(json!([]))
        .timeout(Duration::from_millis(200))
        .max_timeout(Duration::from_millis(400));

    let err = executor().run_isolated::<Value>(&job).await.unwrap_err();
    assert!(matches!(err, IsolationError::TimeoutExceeded { .. }), "got {err}");
}

#[tokio::test]
async fn unknown_job_is_reraised_as_worker_error() {
    let job = IsolatedJob::new("no-such-job").timeout(Duration::from_secs(10));

    let err = executor().run_isolated::<Value>(&job).await.unwrap_err();
    match err {
        IsolationError::Worker { kind, .. } => assert_eq!(kind, "unknown_job"),
        other => panic!("expected worker error, got {other}"),
    }
}

// ============================================================
// `run` and `validate`
// ============================================================

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timed_out_shell_command_does_not_outlive_its_worker() {
    let pid_file = tmp_path("shell-command.pid");
    let _ = std::fs::remove_file(&pid_file);
    let job = IsolatedJob::new("shell")
        .arg(format!("echo $$ > '{}'; exec sleep 30", pid_file.display()))
        .arg("orphan-check")
        .arg(json!([]))
        .timeout(Duration::from_millis(300))
        .max_timeout(Duration::from_millis(300));

    let err = executor().run_isolated::<Value>(&job).await.unwrap_err();
    assert!(matches!(err, IsolationError::TimeoutExceeded { .. }), "got {err}");

    let pid = std::fs::read_to_string(&pid_file).expect("command recorded its pid");
    let pid = pid.trim();
    let mut dead = false;
    for _ in 0..40 {
        if !is_running(pid) {
            dead = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(dead, "shell command {pid} still running after its worker was killed");
}

#[test]
fn run_prints_trace_and_fails_after_first_failure() {
    let marker = tmp_path("cascade-should-not-exist");
    let _ = std::fs::remove_file(&marker);
    let path = write_pipeline(
        "cascade",
        &json!({
            "name": "cascade",
            "stages": [
                { "id": "a", "command": "true" },
                [
                    { "id": "b", "command": "echo \"$1\"", "args": ["isolated"], "isolation": { "timeout_secs": 10 } },
                    { "id": "c", "command": "exit 2" }
                ],
                { "id": "d", "command": "touch \"$1\"", "args": [marker.display().to_string()] }
            ]
        }),
    );

    let output = Command::new(BIN).arg("run").arg(&path).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let trace: Vec<Value> = serde_json::from_slice(&output.stdout).expect("trace on stdout");
    let statuses: Vec<(&str, &str)> = trace
        .iter()
        .map(|r| (r["step_id"].as_str().unwrap(), r["status"].as_str().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        vec![("a", "success"), ("b", "success"), ("c", "failure"), ("d", "skipped")]
    );
    assert_eq!(trace[1]["output"]["stdout"], "isolated\n");
    assert_eq!(trace[2]["error"], "command exited with status 2");
    assert!(!marker.exists(), "skipped step must not run");
}

#[test]
fn run_succeeds_when_every_step_succeeds() {
    let path = write_pipeline(
        "green",
        &json!({ "name": "green", "stages": [ [ { "id": "x", "command": "true" }, { "id": "y", "command": "true" } ] ] }),
    );

    let output = Command::new(BIN).arg("run").arg(&path).output().unwrap();
    assert!(output.status.success());
}

#[test]
fn validate_rejects_duplicate_step_ids() {
    let good = write_pipeline(
        "valid",
        &json!({ "name": "ok", "stages": [ { "id": "a", "command": "true" } ] }),
    );
    let bad = write_pipeline(
        "duplicate",
        &json!({ "name": "dup", "stages": [ { "id": "a", "command": "true" }, { "id": "a", "command": "true" } ] }),
    );

    let ok = Command::new(BIN).arg("validate").arg(&good).output().unwrap();
    assert!(ok.status.success());
    assert!(String::from_utf8_lossy(&ok.stdout).contains("1 step(s)"));

    let rejected = Command::new(BIN).arg("validate").arg(&bad).output().unwrap();
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("duplicate step ID"));
}

#[test]
fn zero_step_timeout_is_rejected() {
    let path = write_pipeline(
        "zero-timeout",
        &json!({ "name": "zero", "stages": [ { "id": "a", "command": "true", "isolation": { "timeout_secs": 0 } } ] }),
    );

    let output = Command::new(BIN).arg("run").arg(&path).output().unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("timeout_secs must be a positive number"));
}
