//! Branch ordering policy.
//!
//! The top-level `steps` array runs in authored order. Nested arrays under
//! `then`, `else`, and `steps` run ordered lexicographically by step id, with
//! entries that do not parse as a normalized step filtered out. The
//! compile-time step-order report applies the same two rules.

use flowgate_types::workflow::{NormalizedWorkflowStep, StepKind};
use serde_json::Value;

/// How a list of sibling steps is ordered before it is walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOrdering {
    /// Keep the order the author wrote.
    Authored,
    /// Sort by step id (stable for equal ids).
    ById,
}

impl BranchOrdering {
    /// Policy for a list at the given nesting depth (0 = top level).
    pub fn for_depth(depth: usize) -> Self {
        if depth == 0 {
            BranchOrdering::Authored
        } else {
            BranchOrdering::ById
        }
    }

    /// Apply the policy to a list of steps in place.
    pub fn apply(self, steps: &mut [NormalizedWorkflowStep]) {
        if self == BranchOrdering::ById {
            steps.sort_by(|a, b| a.id.cmp(&b.id));
        }
    }
}

/// The well-formed steps nested under `key`, ordered by id.
///
/// Returns an empty list when the key is absent or not an array.
pub fn nested_steps(step: &NormalizedWorkflowStep, key: &str) -> Vec<NormalizedWorkflowStep> {
    let mut steps: Vec<NormalizedWorkflowStep> = step
        .branch(key)
        .unwrap_or_default()
        .iter()
        .filter_map(parse_step)
        .collect();
    BranchOrdering::ById.apply(&mut steps);
    steps
}

/// Branch keys the walker can descend into for a step of this kind.
///
/// Only containers have walkable branches; arrays stored under `then`,
/// `else`, or `steps` on any other kind are inert data.
pub fn walked_branch_keys(kind: StepKind) -> &'static [&'static str] {
    match kind {
        StepKind::Conditional => &["then", "else"],
        StepKind::Parallel => &["steps"],
        _ => &[],
    }
}

fn parse_step(value: &Value) -> Option<NormalizedWorkflowStep> {
    serde_json::from_value::<NormalizedWorkflowStep>(value.clone())
        .ok()
        .filter(|step| !step.id.trim().is_empty())
}
