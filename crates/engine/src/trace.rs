//! The ordered record of a plan execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use steps::{StepResult, StepStatus};

/// One result per step, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionTrace {
    results: Vec<StepResult>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn extend(&mut self, results: impl IntoIterator<Item = StepResult>) {
        self.results.extend(results);
    }

    pub fn has_failure(&self) -> bool {
        self.results.iter().any(StepResult::is_failure)
    }

    pub fn first_failure(&self) -> Option<&StepResult> {
        self.results.iter().find(|r| r.is_failure())
    }

    /// Result of the step with the given id.
    pub fn get(&self, step_id: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_id() == step_id)
    }

    pub fn statuses(&self) -> Vec<(&str, StepStatus)> {
        self.results.iter().map(|r| (r.step_id(), r.status())).collect()
    }

    /// Number of results per status.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status().to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepResult> {
        self.results.iter()
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }
}

impl<'a> IntoIterator for &'a ExecutionTrace {
    type Item = &'a StepResult;
    type IntoIter = std::slice::Iter<'a, StepResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
