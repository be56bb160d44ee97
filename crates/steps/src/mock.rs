//! `MockStep` — a test double for [`Step`].
//!
//! Useful in scheduler tests where a real step implementation is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{Step, StepResult};

/// Shared log of step ids in the order their runs completed.
pub type CompletionLog = Arc<Mutex<Vec<String>>>;

/// Behaviour injected into `MockStep` at construction time.
pub enum MockBehaviour {
    /// Succeed with a specific JSON value.
    Succeed(Value),
    /// Report a `Failure` result with the given message.
    Fail(String),
    /// Panic inside `run`.
    Panic(String),
}

/// A mock step that records every call it receives and returns a
/// programmer-specified result.
pub struct MockStep {
    /// Step id used in results and assertions.
    pub name: String,
    /// What the step will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// How long `run` sleeps before completing.
    pub delay: Option<Duration>,
    /// Argument lists seen by this step (in call order).
    pub calls: Arc<Mutex<Vec<Vec<Value>>>>,
    completions: Option<CompletionLog>,
}

impl MockStep {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            completions: None,
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn succeeding(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Succeed(value))
    }

    /// Create a mock that always reports failure.
    pub fn failing(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Fail(msg.into()))
    }

    /// Create a mock whose `run` panics.
    pub fn panicking(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::Panic(msg.into()))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Append this step's id to `log` whenever a run completes.
    pub fn recording_into(mut self, log: CompletionLog) -> Self {
        self.completions = Some(log);
        self
    }

    /// Number of times this step has been run.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Arguments of the most recent run.
    pub fn last_args(&self) -> Option<Vec<Value>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Step for MockStep {
    fn id(&self) -> &str {
        &self.name
    }

    async fn run(&self, args: &[Value]) -> StepResult {
        self.calls.lock().unwrap().push(args.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(log) = &self.completions {
            log.lock().unwrap().push(self.name.clone());
        }

        match &self.behaviour {
            MockBehaviour::Succeed(v) => {
                // Tag the output with the step name so tests can tell results apart.
                let mut out = json!({ "step": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                StepResult::success(&self.name, out)
            }
            MockBehaviour::Fail(msg) => StepResult::failure(&self.name, msg.clone(), Value::Null),
            MockBehaviour::Panic(msg) => panic!("{}", msg),
        }
    }
}
