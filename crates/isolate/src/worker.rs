//! Worker-process side: resolve a job by name, run it, emit one envelope.
//!
//! A binary that wants to host isolated jobs routes its hidden `worker`
//! sub-command into [`serve`] with the registry of jobs it knows about.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::WorkerEnvelope;

/// A job body. Runs synchronously inside the worker and may block freely.
pub type JobFn = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Maps job names to their bodies.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: HashMap<String, JobFn>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, job: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.jobs.insert(name.into(), Arc::new(job));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.jobs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run `name` with `args`, turning every outcome (including a panic) into an envelope.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> WorkerEnvelope {
        let Some(job) = self.jobs.get(name) else {
            return WorkerEnvelope::err("unknown_job", format!("no job registered under '{name}'"));
        };

        match panic::catch_unwind(AssertUnwindSafe(|| job(args))) {
            Ok(Ok(value)) => WorkerEnvelope::Ok { value },
            Ok(Err(err)) => WorkerEnvelope::from_error(&err),
            Err(payload) => WorkerEnvelope::err("panic", panic_message(payload.as_ref())),
        }
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

/// Worker entry point: decode `args_json`, run the job, write exactly one
/// envelope line to `out`.
pub fn serve<W: Write>(
    registry: &JobRegistry,
    name: &str,
    args_json: &str,
    mut out: W,
) -> std::io::Result<()> {
    let envelope = match serde_json::from_str::<Vec<Value>>(args_json) {
        Ok(args) => {
            debug!("worker running job '{}' with {} args", name, args.len());
            registry.invoke(name, args)
        }
        Err(e) => WorkerEnvelope::err("json", format!("invalid job arguments: {e}")),
    };

    if let WorkerEnvelope::Err { kind, message, .. } = &envelope {
        error!("job '{}' failed in worker ({}): {}", name, kind, message);
    }

    let line = envelope.to_line().map_err(std::io::Error::other)?;
    out.write_all(line.as_bytes())?;
    out.flush()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker job panicked".to_owned()
    }
}
