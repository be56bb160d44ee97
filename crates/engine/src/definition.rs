//! Pipeline definition files.
//!
//! A pipeline file is JSON; each entry of `stages` is either one step or an
//! array of steps to run concurrently:
//!
//! ```json
//! {
//!   "name": "connector-ci",
//!   "stages": [
//!     { "id": "build", "command": "make build" },
//!     [
//!       { "id": "unit", "command": "make test" },
//!       { "id": "lint", "command": "make lint", "isolation": { "timeout_secs": 30 } }
//!     ]
//!   ]
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use steps::Step;

use crate::plan::{Invocation, Plan, Stage};
use crate::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageDefinition {
    Single(StepDefinition),
    Group(Vec<StepDefinition>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub id: String,
    pub command: String,
    /// Positional run arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Run the command in an isolated worker with these timeouts.
    #[serde(default)]
    pub isolation: Option<IsolationSettings>,
}

/// Per-step timeout overrides; unset fields fall back to the runner's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IsolationSettings {
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub max_timeout_secs: Option<f64>,
}

impl PipelineDefinition {
    pub fn from_json(content: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Every step definition in flattened order.
    pub fn steps(&self) -> impl Iterator<Item = &StepDefinition> {
        self.stages.iter().flat_map(|stage| match stage {
            StageDefinition::Single(step) => std::slice::from_ref(step),
            StageDefinition::Group(steps) => steps.as_slice(),
        })
    }

    /// Build a validated plan, turning each definition into a step with `factory`.
    pub fn to_plan<F>(&self, mut factory: F) -> Result<Plan, EngineError>
    where
        F: FnMut(&StepDefinition) -> Arc<dyn Step>,
    {
        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let stage = match stage {
                StageDefinition::Single(def) => {
                    Stage::Single(Invocation::with_args(factory(def), def.args.clone()))
                }
                StageDefinition::Group(defs) => Stage::Group(
                    defs.iter()
                        .map(|def| Invocation::with_args(factory(def), def.args.clone()))
                        .collect(),
                ),
            };
            stages.push(stage);
        }

        Plan::new(stages)
    }
}
