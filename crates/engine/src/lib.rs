//! `engine` crate — execution plans, the stage scheduler, and pipeline files.

pub mod definition;
pub mod error;
pub mod plan;
pub mod scheduler;
pub mod trace;

pub use definition::{IsolationSettings, PipelineDefinition, StageDefinition, StepDefinition};
pub use error::EngineError;
pub use plan::{Invocation, Plan, PlanBuilder, Stage};
pub use scheduler::StageScheduler;
pub use trace::ExecutionTrace;

#[cfg(test)]
mod scheduler_tests;
