//! Lifecycle events emitted by the workflow engine.
//!
//! `WorkflowEvent` is delivered synchronously to a caller-supplied sink for
//! every run transition. Events serialize with a dotted `type` tag
//! (`execution.started`, `step.completed`, ...) alongside `executionId` and
//! `ts`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::{ApprovalDecision, RunStatus, StepKind};

/// A single engine lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub execution_id: String,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    /// Stamp an event for `execution_id` with the current time.
    pub fn now(execution_id: &str, kind: WorkflowEventKind) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            ts: Utc::now(),
            kind,
        }
    }

    /// The dotted wire name of this event.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Type-specific event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEventKind {
    #[serde(rename = "execution.started")]
    ExecutionStarted { attempt: u32 },

    #[serde(rename = "execution.resumed", rename_all = "camelCase")]
    ExecutionResumed {
        attempt: u32,
        resume_token: String,
        decision: ApprovalDecision,
    },

    #[serde(rename = "step.started", rename_all = "camelCase")]
    StepStarted {
        step_id: String,
        step_type: StepKind,
        attempt: u32,
    },

    #[serde(rename = "step.completed", rename_all = "camelCase")]
    StepCompleted { step_id: String, attempt: u32 },

    #[serde(rename = "step.failed", rename_all = "camelCase")]
    StepFailed {
        step_id: String,
        attempt: u32,
        error: String,
    },

    #[serde(rename = "step.cancelled", rename_all = "camelCase")]
    StepCancelled { step_id: String, attempt: u32 },

    #[serde(rename = "approval.required", rename_all = "camelCase")]
    ApprovalRequired {
        step_id: String,
        attempt: u32,
        resume_token: String,
    },

    #[serde(rename = "approval.approved", rename_all = "camelCase")]
    ApprovalApproved {
        step_id: String,
        attempt: u32,
        resume_token: String,
    },

    #[serde(rename = "approval.denied", rename_all = "camelCase")]
    ApprovalDenied {
        step_id: String,
        attempt: u32,
        resume_token: String,
    },

    #[serde(rename = "execution.finished")]
    ExecutionFinished {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl WorkflowEventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkflowEventKind::ExecutionStarted { .. } => "execution.started",
            WorkflowEventKind::ExecutionResumed { .. } => "execution.resumed",
            WorkflowEventKind::StepStarted { .. } => "step.started",
            WorkflowEventKind::StepCompleted { .. } => "step.completed",
            WorkflowEventKind::StepFailed { .. } => "step.failed",
            WorkflowEventKind::StepCancelled { .. } => "step.cancelled",
            WorkflowEventKind::ApprovalRequired { .. } => "approval.required",
            WorkflowEventKind::ApprovalApproved { .. } => "approval.approved",
            WorkflowEventKind::ApprovalDenied { .. } => "approval.denied",
            WorkflowEventKind::ExecutionFinished { .. } => "execution.finished",
        }
    }

    /// The step this event concerns, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            WorkflowEventKind::StepStarted { step_id, .. }
            | WorkflowEventKind::StepCompleted { step_id, .. }
            | WorkflowEventKind::StepFailed { step_id, .. }
            | WorkflowEventKind::StepCancelled { step_id, .. }
            | WorkflowEventKind::ApprovalRequired { step_id, .. }
            | WorkflowEventKind::ApprovalApproved { step_id, .. }
            | WorkflowEventKind::ApprovalDenied { step_id, .. } => Some(step_id),
            WorkflowEventKind::ExecutionStarted { .. }
            | WorkflowEventKind::ExecutionResumed { .. }
            | WorkflowEventKind::ExecutionFinished { .. } => None,
        }
    }
}
