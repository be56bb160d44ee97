//! Execution plans.
//!
//! A plan is an ordered list of stages; each stage is either one step or a
//! group of steps that run concurrently. Plans are validated when built:
//! 1. Step IDs must be unique across the whole plan.
//! 2. Groups must contain at least one step.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use steps::Step;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A step bound to the positional arguments it will run with.
#[derive(Clone)]
pub struct Invocation {
    pub step: Arc<dyn Step>,
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self { step, args: Vec::new() }
    }

    pub fn with_args(step: Arc<dyn Step>, args: Vec<Value>) -> Self {
        Self { step, args }
    }

    pub fn step_id(&self) -> &str {
        self.step.id()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("step", &self.step.id())
            .field("args", &self.args)
            .finish()
    }
}

impl<S: Step + 'static> From<Arc<S>> for Invocation {
    fn from(step: Arc<S>) -> Self {
        Invocation::new(step)
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One synchronization unit of a plan.
#[derive(Debug, Clone)]
pub enum Stage {
    Single(Invocation),
    Group(Vec<Invocation>),
}

impl Stage {
    /// The stage's invocations in declared order; a single step is a group of one.
    pub fn invocations(&self) -> &[Invocation] {
        match self {
            Stage::Single(invocation) => std::slice::from_ref(invocation),
            Stage::Group(invocations) => invocations.as_slice(),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A validated, immutable sequence of stages.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    stages: Vec<Stage>,
}

impl Plan {
    /// Validate `stages` and build a plan.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateStepId`] if two steps share an ID.
    /// - [`EngineError::EmptyGroup`] if a group has no steps.
    pub fn new(stages: Vec<Stage>) -> Result<Self, EngineError> {
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (index, stage) in stages.iter().enumerate() {
            if matches!(stage, Stage::Group(g) if g.is_empty()) {
                return Err(EngineError::EmptyGroup { stage: index });
            }
            for invocation in stage.invocations() {
                if !seen_ids.insert(invocation.step_id()) {
                    return Err(EngineError::DuplicateStepId(invocation.step_id().to_owned()));
                }
            }
        }
        Ok(Self { stages })
    }

    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every invocation in flattened plan order.
    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.stages.iter().flat_map(Stage::invocations)
    }

    /// Total number of steps reachable from the plan.
    pub fn step_count(&self) -> usize {
        self.invocations().count()
    }
}

// ---------------------------------------------------------------------------
// PlanBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PlanBuilder {
    stages: Vec<Stage>,
}

impl PlanBuilder {
    /// Append a stage running one step with no arguments.
    pub fn step(self, step: Arc<dyn Step>) -> Self {
        self.stage(Stage::Single(Invocation::new(step)))
    }

    pub fn step_with_args(self, step: Arc<dyn Step>, args: Vec<Value>) -> Self {
        self.stage(Stage::Single(Invocation::with_args(step, args)))
    }

    /// Append a stage running all `invocations` concurrently.
    pub fn group(self, invocations: impl IntoIterator<Item = Invocation>) -> Self {
        self.stage(Stage::Group(invocations.into_iter().collect()))
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<Plan, EngineError> {
        Plan::new(self.stages)
    }
}
