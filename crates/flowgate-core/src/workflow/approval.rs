//! Approval checkpoints and replay-based resume.
//!
//! Every approval step has a deterministic resume token derived from the
//! execution id, the step id, and the attempt number. Resuming re-walks the
//! whole definition from the start; steps before the target checkpoint run
//! again, including non-idempotent ones such as bash commands. Callers that
//! cannot tolerate duplicated side effects must make those steps idempotent.

use std::collections::HashSet;

use flowgate_types::workflow::{
    ApprovalDecision, NormalizedWorkflowDefinition, NormalizedWorkflowStep, StepKind,
};

use super::canonical::sha256_hex;
use super::ordering::{nested_steps, walked_branch_keys};

/// Prefix carried by every resume token.
pub const RESUME_TOKEN_PREFIX: &str = "wrf_rt_";

/// Number of hex digest characters kept in a token.
const RESUME_TOKEN_HEX_LEN: usize = 24;

/// Compute the resume token for an approval step.
pub fn resume_token(execution_id: &str, step_id: &str, attempt: u32) -> String {
    let digest = sha256_hex(&format!("{execution_id}:{step_id}:{attempt}"));
    format!("{RESUME_TOKEN_PREFIX}{}", &digest[..RESUME_TOKEN_HEX_LEN])
}

/// An approval step the walker can reach, with its resume token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalGate {
    pub step_id: String,
    pub token: String,
}

/// Approval steps reachable through walkable branches, in static walk order
/// (top level as authored, nested branches by id, `then` before `else`).
pub fn approval_gates(
    workflow: &NormalizedWorkflowDefinition,
    execution_id: &str,
    attempt: u32,
) -> Vec<ApprovalGate> {
    let mut gates = Vec::new();
    for step in &workflow.steps {
        collect_gates(step, execution_id, attempt, &mut gates);
    }
    gates
}

fn collect_gates(
    step: &NormalizedWorkflowStep,
    execution_id: &str,
    attempt: u32,
    gates: &mut Vec<ApprovalGate>,
) {
    if step.kind == StepKind::Approval {
        gates.push(ApprovalGate {
            step_id: step.id.clone(),
            token: resume_token(execution_id, &step.id, attempt),
        });
    }
    for key in walked_branch_keys(step.kind) {
        for child in nested_steps(step, key) {
            collect_gates(&child, execution_id, attempt, gates);
        }
    }
}

/// State carried through a resume walk.
#[derive(Debug, Clone)]
pub struct ResumeState {
    pub token: String,
    pub decision: ApprovalDecision,
    /// Flips to true once the walk reaches the checkpoint the token names.
    pub matched: bool,
    /// Step id the token belongs to, if it names a reachable approval step of
    /// this definition and attempt.
    pub target_step: Option<String>,
    /// Tokens of the gates that precede the target in walk order.
    pub replayable: HashSet<String>,
}

impl ResumeState {
    pub fn new(
        token: &str,
        decision: ApprovalDecision,
        workflow: &NormalizedWorkflowDefinition,
        execution_id: &str,
        attempt: u32,
    ) -> Self {
        let gates = approval_gates(workflow, execution_id, attempt);
        let (target_step, replayable) = match gates.iter().position(|g| g.token == token) {
            Some(pos) => (
                Some(gates[pos].step_id.clone()),
                gates[..pos].iter().map(|g| g.token.clone()).collect(),
            ),
            None => (None, HashSet::new()),
        };
        Self {
            token: token.to_string(),
            decision,
            matched: false,
            target_step,
            replayable,
        }
    }
}

/// What the walker does when it reaches an approval step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Suspend the run and surface an approval request.
    Suspend,
    /// This is the resumed checkpoint; apply the decision.
    Apply(ApprovalDecision),
    /// A checkpoint ahead of the resumed one in walk order; replay it as
    /// granted.
    Replay,
    /// The token names neither this gate nor a later one.
    Mismatch,
}

/// Decide how to treat an approval step whose own token is `step_token`.
pub fn gate_action(resume: Option<&ResumeState>, step_token: &str) -> GateAction {
    match resume {
        None => GateAction::Suspend,
        Some(state) if state.matched => GateAction::Suspend,
        Some(state) if state.token == step_token => GateAction::Apply(state.decision),
        Some(state) if state.replayable.contains(step_token) => GateAction::Replay,
        Some(_) => GateAction::Mismatch,
    }
}
