//! Workflow executor: a sequential, depth-first interpreter with replay resume.
//!
//! `WorkflowEngine` walks a compiled definition step by step. Each call to
//! `run` or `resume` builds a fresh `ExecutionContext`; nothing is persisted
//! between calls. Approval steps suspend the walk and hand back a resume
//! token. Resuming replays the walk from the first step until it reaches the
//! checkpoint the token names, then applies the decision there.
//!
//! # Execution flow
//!
//! 1. Emit `execution.started` (and `execution.resumed` on resume).
//! 2. Walk the top-level steps in authored order. Nested branches are walked
//!    ordered by step id.
//! 3. Each step: check the step budget -> record a `running` ledger entry ->
//!    dispatch on its kind -> settle the entry and emit its terminal event.
//! 4. The first failure aborts the whole run; a suspension or a denial stops
//!    the walk without failing it.
//! 5. Emit `execution.finished` and return the envelope.

use std::future::Future;
use std::sync::Arc;

use flowgate_types::config::{DEFAULT_MAX_STEPS, EngineConfig};
use flowgate_types::event::{WorkflowEvent, WorkflowEventKind};
use flowgate_types::workflow::{
    ApprovalDecision, ApprovalRequest, NormalizedWorkflowDefinition, NormalizedWorkflowStep,
    RunPayload, RunStatus, StepKind, StepStatus, WorkflowRunEnvelope,
};
use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::sink::EventSink;

use super::approval::{GateAction, ResumeState, gate_action, resume_token};
use super::bash::BashExecutor;
use super::condition::Condition;
use super::context::ExecutionContext;
use super::ordering::{BranchOrdering, nested_steps};
use super::step_runner::{StepHooks, StepRunner};

/// Prompt shown when an approval step declares none.
pub const DEFAULT_APPROVAL_PROMPT: &str = "Approval required";

// ---------------------------------------------------------------------------
// WorkflowExecutor trait
// ---------------------------------------------------------------------------

/// Trait for workflow execution engines.
///
/// Uses RPITIT for the async methods. Both methods always produce an
/// envelope; failures are reported through its `status` and `error`.
pub trait WorkflowExecutor: Send + Sync {
    /// Execute a compiled workflow from the beginning.
    fn run(
        &self,
        execution_id: &str,
        workflow: &NormalizedWorkflowDefinition,
        payload: &RunPayload,
    ) -> impl Future<Output = WorkflowRunEnvelope> + Send;

    /// Replay a workflow up to the checkpoint named by `resume_token` and
    /// apply `decision` there.
    fn resume(
        &self,
        execution_id: &str,
        workflow: &NormalizedWorkflowDefinition,
        payload: &RunPayload,
        resume_token: &str,
        decision: ApprovalDecision,
    ) -> impl Future<Output = WorkflowRunEnvelope> + Send;
}

// ---------------------------------------------------------------------------
// ExecutorError
// ---------------------------------------------------------------------------

/// Errors that abort a run. The Display string becomes the envelope `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("{error}")]
    StepFailed { step_id: String, error: String },

    #[error("max_steps_exceeded:{max}")]
    MaxStepsExceeded { max: u32 },

    #[error("resume_token_mismatch:{step_id}")]
    ResumeTokenMismatch { step_id: String },

    #[error("resume_token_not_found")]
    ResumeTokenNotFound,
}

/// How a walk over a list of steps ended, short of failing.
#[derive(Debug)]
enum Flow {
    Continue,
    Suspended(ApprovalRequest),
    Cancelled,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// The default `WorkflowExecutor`.
pub struct WorkflowEngine {
    runner: StepRunner,
    sink: Option<Arc<dyn EventSink>>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(bash: Arc<dyn BashExecutor>) -> Self {
        let config = EngineConfig::default();
        Self {
            runner: StepRunner::new(bash, &config),
            sink: None,
            config,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.runner.apply_config(&config);
        self.config = config;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn StepHooks>) -> Self {
        self.runner.set_hooks(hooks);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn execute(
        &self,
        execution_id: &str,
        workflow: &NormalizedWorkflowDefinition,
        payload: &RunPayload,
        resume: Option<(&str, ApprovalDecision)>,
    ) -> WorkflowRunEnvelope {
        let attempt = payload.attempt();
        let max_steps = payload.max_steps().unwrap_or(if self.config.max_steps > 0 {
            self.config.max_steps
        } else {
            DEFAULT_MAX_STEPS
        });

        let mut ctx =
            ExecutionContext::new(execution_id, attempt, payload.variables.clone(), max_steps);
        self.emit(&ctx, WorkflowEventKind::ExecutionStarted { attempt });

        if let Some((token, decision)) = resume {
            let state = ResumeState::new(token, decision, workflow, execution_id, attempt);
            info!(
                execution_id,
                attempt,
                decision = %decision,
                target_step = state.target_step.as_deref().unwrap_or("<unknown>"),
                "Resuming workflow"
            );
            ctx = ctx.with_resume(state);
            self.emit(
                &ctx,
                WorkflowEventKind::ExecutionResumed {
                    attempt,
                    resume_token: token.to_string(),
                    decision,
                },
            );
        } else {
            info!(
                execution_id,
                attempt,
                max_steps,
                steps = workflow.steps.len(),
                "Starting workflow"
            );
        }

        let mut top_level = workflow.steps.clone();
        BranchOrdering::for_depth(0).apply(&mut top_level);

        let outcome = match self.walk_steps(&top_level, &mut ctx).await {
            Ok(Flow::Continue) if ctx.resume.is_some() && !ctx.resume_matched() => {
                warn!(execution_id, "Resume token matched no approval step on the walked path");
                Err(ExecutorError::ResumeTokenNotFound)
            }
            other => other,
        };

        let (status, requires_approval, error) = match outcome {
            Ok(Flow::Continue) => (RunStatus::Ok, None, None),
            Ok(Flow::Suspended(request)) => (RunStatus::NeedsApproval, Some(request), None),
            Ok(Flow::Cancelled) => (RunStatus::Cancelled, None, None),
            Err(e) => (RunStatus::Failed, None, Some(e.to_string())),
        };

        self.emit(
            &ctx,
            WorkflowEventKind::ExecutionFinished {
                status,
                error: error.clone(),
            },
        );
        info!(
            execution_id,
            status = %status,
            steps = ctx.steps.len(),
            error = error.as_deref().unwrap_or(""),
            "Workflow finished"
        );

        WorkflowRunEnvelope {
            ok: status == RunStatus::Ok,
            status,
            execution_id: ctx.execution_id,
            output: ctx.outputs,
            steps: ctx.steps,
            requires_approval,
            error,
        }
    }

    /// Walk a list of sibling steps, stopping at the first non-`Continue`.
    fn walk_steps<'a>(
        &'a self,
        steps: &'a [NormalizedWorkflowStep],
        ctx: &'a mut ExecutionContext,
    ) -> BoxFuture<'a, Result<Flow, ExecutorError>> {
        Box::pin(async move {
            for step in steps {
                match self.run_step(step, ctx).await? {
                    Flow::Continue => {}
                    stop => return Ok(stop),
                }
            }
            Ok(Flow::Continue)
        })
    }

    async fn run_step(
        &self,
        step: &NormalizedWorkflowStep,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow, ExecutorError> {
        if ctx.budget_exhausted() {
            warn!(
                execution_id = %ctx.execution_id,
                step_id = %step.id,
                max_steps = ctx.max_steps,
                "Step budget exhausted"
            );
            return Err(ExecutorError::MaxStepsExceeded { max: ctx.max_steps });
        }
        ctx.visit();

        let index = ctx.begin_step(&step.id);
        self.emit(
            ctx,
            WorkflowEventKind::StepStarted {
                step_id: step.id.clone(),
                step_type: step.kind,
                attempt: ctx.attempt,
            },
        );
        debug!(
            execution_id = %ctx.execution_id,
            step_id = %step.id,
            kind = %step.kind,
            "Step started"
        );

        let result = match step.kind {
            StepKind::Approval => return self.run_approval(step, index, ctx),
            StepKind::Conditional => {
                let condition = Condition::parse(step.field("condition")).evaluate(ctx);
                let key = if condition { "then" } else { "else" };
                let children = nested_steps(step, key);
                let output = json!({
                    "type": "conditional",
                    "condition": condition,
                    "branch": key,
                    "steps": children.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                });
                return self.run_branch(step, index, &children, output, ctx).await;
            }
            StepKind::Parallel => {
                let children = nested_steps(step, "steps");
                let output = json!({
                    "type": "parallel",
                    "steps": children.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
                });
                return self.run_branch(step, index, &children, output, ctx).await;
            }
            StepKind::Tool => self.runner.run_tool(step, ctx).await,
            StepKind::Agent => self.runner.run_agent(step, ctx).await,
            StepKind::Bash => self.runner.run_bash_step(step).await,
            StepKind::AgentMessage | StepKind::Loop | StepKind::Subworkflow => {
                Ok(self.runner.run_passthrough(step))
            }
        };

        match result {
            Ok(output) => {
                self.complete_step(step, index, output, ctx);
                Ok(Flow::Continue)
            }
            Err(e) => {
                let error = e.to_string();
                ctx.finish_step(
                    index,
                    StepStatus::Failed,
                    e.output().cloned(),
                    Some(error.clone()),
                );
                self.fail_event(step, &error, ctx);
                Err(ExecutorError::StepFailed {
                    step_id: step.id.clone(),
                    error,
                })
            }
        }
    }

    /// Walk a container's children and settle the container's own entry
    /// to match how the branch ended. A suspended branch leaves it `running`.
    async fn run_branch(
        &self,
        step: &NormalizedWorkflowStep,
        index: usize,
        children: &[NormalizedWorkflowStep],
        output: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow, ExecutorError> {
        match self.walk_steps(children, ctx).await {
            Ok(Flow::Continue) => {
                self.complete_step(step, index, output, ctx);
                Ok(Flow::Continue)
            }
            Ok(Flow::Suspended(request)) => Ok(Flow::Suspended(request)),
            Ok(Flow::Cancelled) => {
                ctx.finish_step(index, StepStatus::Cancelled, Some(output), None);
                self.emit(
                    ctx,
                    WorkflowEventKind::StepCancelled {
                        step_id: step.id.clone(),
                        attempt: ctx.attempt,
                    },
                );
                Ok(Flow::Cancelled)
            }
            Err(e) => {
                let error = e.to_string();
                ctx.finish_step(index, StepStatus::Failed, Some(output), Some(error.clone()));
                self.fail_event(step, &error, ctx);
                Err(e)
            }
        }
    }

    fn run_approval(
        &self,
        step: &NormalizedWorkflowStep,
        index: usize,
        ctx: &mut ExecutionContext,
    ) -> Result<Flow, ExecutorError> {
        let token = resume_token(&ctx.execution_id, &step.id, ctx.attempt);
        let attempt = ctx.attempt;

        match gate_action(ctx.resume.as_ref(), &token) {
            GateAction::Suspend => {
                let request = ApprovalRequest {
                    step_id: step.id.clone(),
                    prompt: step
                        .str_field("prompt")
                        .unwrap_or(DEFAULT_APPROVAL_PROMPT)
                        .to_string(),
                    items: step
                        .field("items")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                    resume_token: token.clone(),
                };
                let output = json!({
                    "prompt": request.prompt,
                    "items": request.items,
                    "resumeToken": token,
                });
                ctx.finish_step(index, StepStatus::WaitingApproval, Some(output), None);
                self.emit(
                    ctx,
                    WorkflowEventKind::ApprovalRequired {
                        step_id: step.id.clone(),
                        attempt,
                        resume_token: token,
                    },
                );
                info!(
                    execution_id = %ctx.execution_id,
                    step_id = %step.id,
                    "Workflow waiting for approval"
                );
                Ok(Flow::Suspended(request))
            }
            GateAction::Apply(ApprovalDecision::Approve) => {
                if let Some(resume) = ctx.resume.as_mut() {
                    resume.matched = true;
                }
                self.emit(
                    ctx,
                    WorkflowEventKind::ApprovalApproved {
                        step_id: step.id.clone(),
                        attempt,
                        resume_token: token.clone(),
                    },
                );
                info!(execution_id = %ctx.execution_id, step_id = %step.id, "Approval granted");
                let output = json!({ "approved": true, "resumeToken": token });
                self.complete_step(step, index, output, ctx);
                Ok(Flow::Continue)
            }
            GateAction::Apply(ApprovalDecision::Deny) => {
                if let Some(resume) = ctx.resume.as_mut() {
                    resume.matched = true;
                }
                let output = json!({ "approved": false, "resumeToken": token });
                ctx.finish_step(index, StepStatus::Cancelled, Some(output), None);
                self.emit(
                    ctx,
                    WorkflowEventKind::ApprovalDenied {
                        step_id: step.id.clone(),
                        attempt,
                        resume_token: token,
                    },
                );
                self.emit(
                    ctx,
                    WorkflowEventKind::StepCancelled {
                        step_id: step.id.clone(),
                        attempt,
                    },
                );
                info!(execution_id = %ctx.execution_id, step_id = %step.id, "Approval denied");
                Ok(Flow::Cancelled)
            }
            GateAction::Replay => {
                debug!(
                    execution_id = %ctx.execution_id,
                    step_id = %step.id,
                    "Replaying earlier approval"
                );
                let output = json!({ "approved": true, "replayed": true });
                self.complete_step(step, index, output, ctx);
                Ok(Flow::Continue)
            }
            GateAction::Mismatch => {
                let err = ExecutorError::ResumeTokenMismatch {
                    step_id: step.id.clone(),
                };
                let error = err.to_string();
                ctx.finish_step(index, StepStatus::Failed, None, Some(error.clone()));
                self.fail_event(step, &error, ctx);
                Err(err)
            }
        }
    }

    /// Mark a step completed, publishing its output if it declares
    /// `outputVariable`.
    fn complete_step(
        &self,
        step: &NormalizedWorkflowStep,
        index: usize,
        output: Value,
        ctx: &mut ExecutionContext,
    ) {
        if let Some(name) = step.output_variable() {
            ctx.publish_output(name, output.clone());
        }
        ctx.finish_step(index, StepStatus::Completed, Some(output), None);
        self.emit(
            ctx,
            WorkflowEventKind::StepCompleted {
                step_id: step.id.clone(),
                attempt: ctx.attempt,
            },
        );
    }

    fn fail_event(&self, step: &NormalizedWorkflowStep, error: &str, ctx: &ExecutionContext) {
        warn!(execution_id = %ctx.execution_id, step_id = %step.id, error, "Step failed");
        self.emit(
            ctx,
            WorkflowEventKind::StepFailed {
                step_id: step.id.clone(),
                attempt: ctx.attempt,
                error: error.to_string(),
            },
        );
    }

    fn emit(&self, ctx: &ExecutionContext, kind: WorkflowEventKind) {
        if let Some(sink) = &self.sink {
            sink.emit(&WorkflowEvent::now(&ctx.execution_id, kind));
        }
    }
}

impl WorkflowExecutor for WorkflowEngine {
    async fn run(
        &self,
        execution_id: &str,
        workflow: &NormalizedWorkflowDefinition,
        payload: &RunPayload,
    ) -> WorkflowRunEnvelope {
        self.execute(execution_id, workflow, payload, None).await
    }

    async fn resume(
        &self,
        execution_id: &str,
        workflow: &NormalizedWorkflowDefinition,
        payload: &RunPayload,
        resume_token: &str,
        decision: ApprovalDecision,
    ) -> WorkflowRunEnvelope {
        self.execute(execution_id, workflow, payload, Some((resume_token, decision)))
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::bash::{BashOutcome, BashRequest};
    use crate::workflow::compiler::compile;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Every command "succeeds" with no output.
    struct NoopBash;

    impl BashExecutor for NoopBash {
        fn execute<'a>(
            &'a self,
            _request: &'a BashRequest,
        ) -> Pin<Box<dyn Future<Output = std::io::Result<BashOutcome>> + Send + 'a>> {
            Box::pin(async {
                Ok(BashOutcome {
                    exit_code: Some(0),
                    ..Default::default()
                })
            })
        }
    }

    fn workflow(raw: Value) -> NormalizedWorkflowDefinition {
        let result = compile(&raw);
        assert!(result.ok, "compile failed: {:?}", result.errors);
        result.workflow.unwrap()
    }

    fn recording_engine() -> (WorkflowEngine, Arc<Mutex<Vec<WorkflowEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let engine = WorkflowEngine::new(Arc::new(NoopBash)).with_sink(Arc::new(
            move |event: &WorkflowEvent| captured.lock().unwrap().push(event.clone()),
        ));
        (engine, events)
    }

    #[tokio::test]
    async fn container_entries_settle_after_children() {
        let (engine, _) = recording_engine();
        let wf = workflow(json!({
            "steps": [{
                "id": "group", "type": "parallel", "outputVariable": "group",
                "steps": [
                    { "id": "b", "type": "loop" },
                    { "id": "a", "type": "subworkflow" },
                ],
            }]
        }));

        let envelope = engine.run("exec", &wf, &RunPayload::default()).await;
        assert_eq!(envelope.status, RunStatus::Ok);
        assert_eq!(envelope.step_ids(), vec!["group", "a", "b"]);
        assert_eq!(envelope.steps[0].status, StepStatus::Completed);
        assert_eq!(envelope.output["group"]["steps"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn failing_child_fails_its_container() {
        let (engine, events) = recording_engine();
        let wf = workflow(json!({
            "steps": [{
                "id": "check", "type": "conditional", "condition": true,
                "then": [ { "id": "inner", "type": "tool", "tool": "bash", "arguments": {} } ],
            }]
        }));

        let envelope = engine.run("exec", &wf, &RunPayload::default()).await;
        assert_eq!(envelope.status, RunStatus::Failed);
        assert_eq!(envelope.error.as_deref(), Some("workflow_tool_bash_missing_command"));
        assert_eq!(envelope.steps[0].status, StepStatus::Failed);
        assert_eq!(envelope.steps[1].status, StepStatus::Failed);

        let failed: Vec<_> = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.type_name() == "step.failed")
            .filter_map(|e| e.kind.step_id().map(str::to_string))
            .collect();
        assert_eq!(failed, vec!["inner", "check"]);
    }

    #[tokio::test]
    async fn configured_budget_applies_without_payload_override() {
        let engine = WorkflowEngine::new(Arc::new(NoopBash)).with_config(EngineConfig {
            max_steps: 1,
            ..EngineConfig::default()
        });
        let wf = workflow(json!({
            "steps": [ { "id": "a", "type": "loop" }, { "id": "b", "type": "loop" } ]
        }));
        let envelope = engine.run("exec", &wf, &RunPayload::default()).await;
        assert_eq!(envelope.error.as_deref(), Some("max_steps_exceeded:1"));
        assert_eq!(envelope.step_ids(), vec!["a"]);
    }

    #[test]
    fn executor_error_codes() {
        assert_eq!(ExecutorError::MaxStepsExceeded { max: 3 }.to_string(), "max_steps_exceeded:3");
        assert_eq!(
            ExecutorError::ResumeTokenMismatch { step_id: "gate".into() }.to_string(),
            "resume_token_mismatch:gate"
        );
        assert_eq!(ExecutorError::ResumeTokenNotFound.to_string(), "resume_token_not_found");
        assert_eq!(
            ExecutorError::StepFailed { step_id: "s".into(), error: "bash_exit_code:2".into() }
                .to_string(),
            "bash_exit_code:2"
        );
    }
}
