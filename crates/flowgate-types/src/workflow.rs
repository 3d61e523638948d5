//! Workflow domain types for flowgate.
//!
//! Defines the compiler's output shape (`NormalizedWorkflowDefinition`,
//! `CompileResult`), the engine's input payload (`RunPayload`), and the
//! execution records it returns (`WorkflowStepResult`, `WorkflowRunEnvelope`).
//! Wire field names are camelCase so persisted envelopes and definitions stay
//! readable by non-Rust callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Step kinds
// ---------------------------------------------------------------------------

/// The closed set of step types a definition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Agent,
    AgentMessage,
    Tool,
    Bash,
    Conditional,
    Loop,
    Parallel,
    Subworkflow,
    Approval,
}

impl StepKind {
    /// Every permitted step kind, in declaration order.
    pub const ALL: [StepKind; 9] = [
        StepKind::Agent,
        StepKind::AgentMessage,
        StepKind::Tool,
        StepKind::Bash,
        StepKind::Conditional,
        StepKind::Loop,
        StepKind::Parallel,
        StepKind::Subworkflow,
        StepKind::Approval,
    ];

    /// The wire name of this kind (the value of a step's `type` field).
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Agent => "agent",
            StepKind::AgentMessage => "agent_message",
            StepKind::Tool => "tool",
            StepKind::Bash => "bash",
            StepKind::Conditional => "conditional",
            StepKind::Loop => "loop",
            StepKind::Parallel => "parallel",
            StepKind::Subworkflow => "subworkflow",
            StepKind::Approval => "approval",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a `type` string names no known step kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown step type \"{0}\"")]
pub struct UnknownStepKind(pub String);

impl FromStr for StepKind {
    type Err = UnknownStepKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownStepKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Normalized definition (compiler output)
// ---------------------------------------------------------------------------

/// Keys under which a step may nest further steps.
pub const BRANCH_KEYS: [&str; 3] = ["then", "else", "steps"];

/// A validated step with a resolved id.
///
/// Fields other than `id` and `type` are kept verbatim (after key sorting) in
/// `fields`; nested branch arrays live under `then`, `else`, or `steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWorkflowStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl NormalizedWorkflowStep {
    /// Raw access to a declared field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A string field, trimmed, or `None` if absent, non-string, or blank.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// The step's display name, if declared.
    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// The variable name this step's output is published under.
    pub fn output_variable(&self) -> Option<&str> {
        self.str_field("outputVariable")
    }

    /// The raw nested step array under `key`, if any.
    pub fn branch(&self, key: &str) -> Option<&[Value]> {
        self.fields.get(key).and_then(Value::as_array).map(Vec::as_slice)
    }
}

/// A compiled, canonically key-sorted workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWorkflowDefinition {
    pub steps: Vec<NormalizedWorkflowStep>,
    /// All other top-level fields of the authored definition.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A single validation problem found while compiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileIssue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CompileIssue {
    pub fn new(message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }
}

/// Result of `compile`. Validation is all-or-nothing: when `ok` is false the
/// workflow and hash are `None` and `step_order` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub ok: bool,
    pub workflow: Option<NormalizedWorkflowDefinition>,
    pub workflow_hash: Option<String>,
    pub step_order: Vec<String>,
    pub errors: Vec<CompileIssue>,
}

impl CompileResult {
    /// A failed compile carrying every collected issue.
    pub fn failed(errors: Vec<CompileIssue>) -> Self {
        Self {
            ok: false,
            workflow: None,
            workflow_hash: None,
            step_order: Vec::new(),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Run payload (engine input)
// ---------------------------------------------------------------------------

/// Caller-supplied input for a run or resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPayload {
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub runtime: RuntimeOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<i64>,
    #[serde(default)]
    pub policy: RunPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<i64>,
}

impl RunPayload {
    /// The execution attempt, defaulting to 1 when unset or non-positive.
    pub fn attempt(&self) -> u32 {
        match self.runtime.attempt {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => 1,
        }
    }

    /// The per-run step budget override, if a positive one was supplied.
    pub fn max_steps(&self) -> Option<u32> {
        match self.runtime.policy.max_steps {
            Some(n) if n > 0 => Some(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => None,
        }
    }
}

/// A human decision injected at an approval checkpoint on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::Deny => "deny",
        }
    }
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(ApprovalDecision::Approve),
            "deny" | "denied" => Ok(ApprovalDecision::Deny),
            other => Err(format!("invalid approval decision: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution records (engine output)
// ---------------------------------------------------------------------------

/// Status of one step entry in the run ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    WaitingApproval,
}

/// Terminal status of a run or resume call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Ok,
    Failed,
    Cancelled,
    NeedsApproval,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::NeedsApproval => "needs_approval",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the step ledger, appended in visitation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowStepResult {
    /// A fresh `running` entry stamped with the current time.
    pub fn started(step_id: &str, attempt: u32) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            attempt,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
        }
    }
}

/// The block surfaced when a run suspends at an approval checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub step_id: String,
    pub prompt: String,
    pub items: Vec<Value>,
    pub resume_token: String,
}

/// Terminal result of `run`/`resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunEnvelope {
    pub ok: bool,
    pub status: RunStatus,
    pub execution_id: String,
    pub output: Map<String, Value>,
    pub steps: Vec<WorkflowStepResult>,
    pub requires_approval: Option<ApprovalRequest>,
    pub error: Option<String>,
}

impl WorkflowRunEnvelope {
    /// Step ids in ledger order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_id.as_str()).collect()
    }

    /// The resume token, if the run is suspended.
    pub fn resume_token(&self) -> Option<&str> {
        self.requires_approval
            .as_ref()
            .map(|r| r.resume_token.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_kind_parses_every_wire_name() {
        for kind in StepKind::ALL {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }
        let err = "webhook".parse::<StepKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown step type \"webhook\"");
    }

    #[test]
    fn step_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&StepKind::AgentMessage).unwrap();
        assert_eq!(json, "\"agent_message\"");
    }

    #[test]
    fn normalized_step_flattens_extra_fields() {
        let step: NormalizedWorkflowStep = serde_json::from_value(json!({
            "id": "lint",
            "type": "tool",
            "tool": "npm_lint",
            "outputVariable": " lintResult ",
        }))
        .unwrap();
        assert_eq!(step.kind, StepKind::Tool);
        assert_eq!(step.str_field("tool"), Some("npm_lint"));
        assert_eq!(step.output_variable(), Some("lintResult"));
        assert!(!step.fields.contains_key("id"));

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["type"], "tool");
        assert_eq!(back["id"], "lint");
    }

    #[test]
    fn payload_attempt_defaults_to_one() {
        let payload: RunPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(payload.attempt(), 1);

        let payload: RunPayload =
            serde_json::from_value(json!({ "runtime": { "attempt": -3 } })).unwrap();
        assert_eq!(payload.attempt(), 1);

        let payload: RunPayload =
            serde_json::from_value(json!({ "runtime": { "attempt": 4 } })).unwrap();
        assert_eq!(payload.attempt(), 4);
    }

    #[test]
    fn payload_max_steps_override() {
        let payload: RunPayload = serde_json::from_value(json!({
            "runtime": { "policy": { "maxSteps": 7 } }
        }))
        .unwrap();
        assert_eq!(payload.max_steps(), Some(7));

        let payload: RunPayload = serde_json::from_value(json!({
            "runtime": { "policy": { "maxSteps": 0 } }
        }))
        .unwrap();
        assert_eq!(payload.max_steps(), None);
    }

    #[test]
    fn approval_decision_from_str() {
        assert_eq!("approve".parse::<ApprovalDecision>(), Ok(ApprovalDecision::Approve));
        assert_eq!(" DENY ".parse::<ApprovalDecision>(), Ok(ApprovalDecision::Deny));
        assert!("maybe".parse::<ApprovalDecision>().is_err());
    }

    #[test]
    fn envelope_serializes_camel_case_with_nulls() {
        let envelope = WorkflowRunEnvelope {
            ok: true,
            status: RunStatus::Ok,
            execution_id: "exec-1".to_string(),
            output: Map::new(),
            steps: vec![],
            requires_approval: None,
            error: None,
        };
        let v = serde_json::to_value(&envelope).unwrap();
        assert_eq!(v["executionId"], "exec-1");
        assert_eq!(v["status"], "ok");
        assert!(v["requiresApproval"].is_null());
        assert!(v.as_object().unwrap().contains_key("error"));
    }

    #[test]
    fn run_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::NeedsApproval).unwrap(),
            "\"needs_approval\""
        );
        assert_eq!(
            serde_json::to_string(&StepStatus::WaitingApproval).unwrap(),
            "\"waiting_approval\""
        );
    }
}
