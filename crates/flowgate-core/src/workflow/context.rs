//! Per-call execution context.
//!
//! `ExecutionContext` is the mutable state threaded through one `run` or
//! `resume` call: the variable and output environment, the step ledger, the
//! step budget, and the resume state. It is created fresh per call and
//! discarded once the envelope is built; nothing survives between calls.

use chrono::Utc;
use flowgate_types::workflow::{StepStatus, WorkflowStepResult};
use serde_json::{Map, Value};

use super::approval::ResumeState;

/// Mutable state for a single engine invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub attempt: u32,
    /// Caller-supplied variables (read-only during the walk).
    pub variables: Map<String, Value>,
    /// Outputs published by steps that declare `outputVariable`.
    pub outputs: Map<String, Value>,
    /// Step ledger in visitation order. Replayed steps are appended again.
    pub steps: Vec<WorkflowStepResult>,
    pub max_steps: u32,
    /// Steps examined so far, nested or not.
    pub visited_steps: u32,
    pub resume: Option<ResumeState>,
}

impl ExecutionContext {
    pub fn new(
        execution_id: &str,
        attempt: u32,
        variables: Map<String, Value>,
        max_steps: u32,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            attempt,
            variables,
            outputs: Map::new(),
            steps: Vec::new(),
            max_steps,
            visited_steps: 0,
            resume: None,
        }
    }

    pub fn with_resume(mut self, resume: ResumeState) -> Self {
        self.resume = Some(resume);
        self
    }

    /// Resolve a name against variables, falling back to published outputs.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).or_else(|| self.outputs.get(name))
    }

    /// Publish a step output under `name`.
    pub fn publish_output(&mut self, name: &str, value: Value) {
        self.outputs.insert(name.to_string(), value);
    }

    /// Whether the step budget has been used up.
    pub fn budget_exhausted(&self) -> bool {
        self.visited_steps >= self.max_steps
    }

    /// Count one more examined step.
    pub fn visit(&mut self) {
        self.visited_steps += 1;
    }

    /// Append a `running` ledger entry and return its index.
    pub fn begin_step(&mut self, step_id: &str) -> usize {
        self.steps
            .push(WorkflowStepResult::started(step_id, self.attempt));
        self.steps.len() - 1
    }

    /// Settle a ledger entry with a terminal (or waiting) status.
    pub fn finish_step(
        &mut self,
        index: usize,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
    ) {
        if let Some(entry) = self.steps.get_mut(index) {
            entry.status = status;
            if status != StepStatus::WaitingApproval {
                entry.completed_at = Some(Utc::now());
            }
            if output.is_some() {
                entry.output = output;
            }
            entry.error = error;
        }
    }

    /// Whether a resume call has reached its target checkpoint.
    pub fn resume_matched(&self) -> bool {
        self.resume.as_ref().is_some_and(|r| r.matched)
    }
}
