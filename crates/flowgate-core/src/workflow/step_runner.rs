//! Leaf step handlers.
//!
//! `StepRunner` executes the step kinds that do not nest other steps: `tool`,
//! `agent`, `bash` and the no-op kinds. Structural kinds (`approval`,
//! `conditional`, `parallel`) are handled by the walker in `executor`.
//!
//! Callers can intercept `tool` and `agent` steps through [`StepHooks`]. A hook
//! returning `None` falls through to the default echo.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use flowgate_types::config::EngineConfig;
use flowgate_types::workflow::NormalizedWorkflowStep;
use serde_json::{Value, json};
use thiserror::Error;

use super::bash::{BashExecutor, BashRequest, settle_bash};
use super::context::ExecutionContext;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// A step handler failure. The Display string is the error code recorded on
/// the step and on the run envelope.
#[derive(Debug, Error)]
pub enum StepError {
    /// Free-form failure reported by a hook.
    #[error("{0}")]
    ExecutionFailed(String),

    #[error("workflow_tool_bash_missing_command")]
    BashMissingCommand,

    #[error("bash_spawn_failed:{reason}")]
    BashSpawnFailed { reason: String, output: Value },

    #[error("bash_timeout:{timeout_ms}")]
    BashTimeout { timeout_ms: u64, output: Value },

    #[error("bash_exit_code:{code}")]
    BashExitCode { code: i32, output: Value },
}

impl StepError {
    /// Diagnostic output attached to the failure, if any.
    pub fn output(&self) -> Option<&Value> {
        match self {
            StepError::BashSpawnFailed { output, .. }
            | StepError::BashTimeout { output, .. }
            | StepError::BashExitCode { output, .. } => Some(output),
            StepError::ExecutionFailed(_) | StepError::BashMissingCommand => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Future returned by a hook. `None` defers to the default handler.
pub type HookFuture<'a> =
    Pin<Box<dyn Future<Output = Option<Result<Value, StepError>>> + Send + 'a>>;

/// Caller-supplied handlers for `tool` and `agent` steps.
pub trait StepHooks: Send + Sync {
    fn on_tool_step<'a>(
        &'a self,
        _step: &'a NormalizedWorkflowStep,
        _ctx: &'a ExecutionContext,
    ) -> HookFuture<'a> {
        Box::pin(async { None })
    }

    fn on_agent_step<'a>(
        &'a self,
        _step: &'a NormalizedWorkflowStep,
        _ctx: &'a ExecutionContext,
    ) -> HookFuture<'a> {
        Box::pin(async { None })
    }
}

/// Hooks that never intercept anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl StepHooks for NoHooks {}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Dispatches leaf steps to hooks, the bash executor, or default echoes.
pub struct StepRunner {
    hooks: Arc<dyn StepHooks>,
    bash: Arc<dyn BashExecutor>,
    default_cwd: PathBuf,
    bash_timeout_ms: u64,
}

impl StepRunner {
    pub fn new(bash: Arc<dyn BashExecutor>, config: &EngineConfig) -> Self {
        Self {
            hooks: Arc::new(NoHooks),
            bash,
            default_cwd: resolve_default_cwd(config),
            bash_timeout_ms: config.clamped_bash_timeout_ms(),
        }
    }

    pub fn set_hooks(&mut self, hooks: Arc<dyn StepHooks>) {
        self.hooks = hooks;
    }

    pub fn apply_config(&mut self, config: &EngineConfig) {
        self.default_cwd = resolve_default_cwd(config);
        self.bash_timeout_ms = config.clamped_bash_timeout_ms();
    }

    /// `tool` step: `bash` goes to the executor, anything else to the hook or echo.
    pub async fn run_tool(
        &self,
        step: &NormalizedWorkflowStep,
        ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        if step.str_field("tool") == Some("bash") {
            return self.run_bash(step.field("arguments")).await;
        }
        if let Some(result) = self.hooks.on_tool_step(step, ctx).await {
            return result;
        }
        Ok(json!({
            "type": "tool",
            "tool": step.field("tool").cloned().unwrap_or(Value::Null),
            "arguments": step.field("arguments").cloned().unwrap_or(Value::Null),
        }))
    }

    /// `agent` step: hook or echo of `goal`/`context`.
    pub async fn run_agent(
        &self,
        step: &NormalizedWorkflowStep,
        ctx: &ExecutionContext,
    ) -> Result<Value, StepError> {
        if let Some(result) = self.hooks.on_agent_step(step, ctx).await {
            return result;
        }
        Ok(json!({
            "type": "agent",
            "goal": step.field("goal").cloned().unwrap_or(Value::Null),
            "context": step.field("context").cloned().unwrap_or(Value::Null),
        }))
    }

    /// `bash` step: the step's own fields are the arguments.
    pub async fn run_bash_step(&self, step: &NormalizedWorkflowStep) -> Result<Value, StepError> {
        let arguments = Value::Object(step.fields.clone());
        self.run_bash(Some(&arguments)).await
    }

    /// Completed no-op echoing `{type, name}`.
    pub fn run_passthrough(&self, step: &NormalizedWorkflowStep) -> Value {
        json!({
            "type": step.kind.as_str(),
            "name": step.field("name").cloned().unwrap_or(Value::Null),
        })
    }

    async fn run_bash(&self, arguments: Option<&Value>) -> Result<Value, StepError> {
        let request =
            BashRequest::from_arguments(arguments, &self.default_cwd, self.bash_timeout_ms)?;
        tracing::debug!(
            command = %request.command,
            cwd = %request.cwd.display(),
            timeout_ms = request.timeout_ms,
            "Running bash step"
        );
        let result = self.bash.execute(&request).await;
        settle_bash(&request, result)
    }
}

fn resolve_default_cwd(config: &EngineConfig) -> PathBuf {
    config
        .default_cwd
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::bash::BashOutcome;
    use flowgate_types::workflow::StepKind;
    use serde_json::Map;
    use std::sync::Mutex;

    /// Records requests and answers every one with a fixed outcome.
    struct RecordingBash {
        outcome: BashOutcome,
        seen: Mutex<Vec<BashRequest>>,
    }

    impl BashExecutor for RecordingBash {
        fn execute<'a>(
            &'a self,
            request: &'a BashRequest,
        ) -> Pin<Box<dyn Future<Output = std::io::Result<BashOutcome>> + Send + 'a>> {
            self.seen.lock().unwrap().push(request.clone());
            let outcome = self.outcome.clone();
            Box::pin(async move { Ok(outcome) })
        }
    }

    struct EchoHooks;

    impl StepHooks for EchoHooks {
        fn on_tool_step<'a>(
            &'a self,
            step: &'a NormalizedWorkflowStep,
            ctx: &'a ExecutionContext,
        ) -> HookFuture<'a> {
            Box::pin(async move {
                if step.str_field("tool") == Some("explode") {
                    return Some(Err(StepError::ExecutionFailed("tool_exploded".into())));
                }
                Some(Ok(json!({ "handled": step.id, "execution": ctx.execution_id })))
            })
        }
    }

    fn step(value: Value) -> NormalizedWorkflowStep {
        serde_json::from_value(value).unwrap()
    }

    fn runner(outcome: BashOutcome) -> (StepRunner, Arc<RecordingBash>) {
        let bash = Arc::new(RecordingBash { outcome, seen: Mutex::new(Vec::new()) });
        let config = EngineConfig {
            default_cwd: Some(PathBuf::from("/srv")),
            ..EngineConfig::default()
        };
        (StepRunner::new(bash.clone(), &config), bash)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("exec", 1, Map::new(), 50)
    }

    #[tokio::test]
    async fn tool_echo_without_hooks() {
        let (runner, _) = runner(BashOutcome::default());
        let s = step(json!({
            "id": "lint",
            "type": "tool",
            "tool": "npm_lint",
            "arguments": { "fix": true },
        }));
        let out = runner.run_tool(&s, &ctx()).await.unwrap();
        assert_eq!(out["tool"], "npm_lint");
        assert_eq!(out["arguments"]["fix"], true);
    }

    #[tokio::test]
    async fn hooks_override_tool_steps() {
        let (mut runner, _) = runner(BashOutcome::default());
        runner.set_hooks(Arc::new(EchoHooks));

        let s = step(json!({ "id": "lint", "type": "tool", "tool": "npm_lint" }));
        let out = runner.run_tool(&s, &ctx()).await.unwrap();
        assert_eq!(out, json!({ "handled": "lint", "execution": "exec" }));

        let s = step(json!({ "id": "boom", "type": "tool", "tool": "explode" }));
        let err = runner.run_tool(&s, &ctx()).await.unwrap_err();
        assert_eq!(err.to_string(), "tool_exploded");
    }

    #[tokio::test]
    async fn agent_echo_falls_through_default_hook() {
        let (mut runner, _) = runner(BashOutcome::default());
        runner.set_hooks(Arc::new(EchoHooks));
        let s = step(json!({ "id": "plan", "type": "agent", "goal": "plan release" }));
        let out = runner.run_agent(&s, &ctx()).await.unwrap();
        assert_eq!(out["goal"], "plan release");
        assert!(out["context"].is_null());
    }

    #[tokio::test]
    async fn bash_tool_uses_arguments_and_default_cwd() {
        let (runner, bash) = runner(BashOutcome { exit_code: Some(0), ..Default::default() });
        let s = step(json!({
            "id": "build", "type": "tool", "tool": "bash",
            "arguments": { "command": "make", "timeoutMs": 2500 }
        }));
        let out = runner.run_tool(&s, &ctx()).await.unwrap();
        assert_eq!(out["command"], "make");

        let seen = bash.seen.lock().unwrap();
        assert_eq!(seen[0].cwd, PathBuf::from("/srv"));
        assert_eq!(seen[0].timeout_ms, 2500);
    }

    #[tokio::test]
    async fn bash_step_reads_its_own_fields() {
        let (runner, bash) = runner(BashOutcome { exit_code: Some(0), ..Default::default() });
        let s = step(json!({ "id": "b", "type": "bash", "command": "echo hi", "cwd": "/tmp" }));
        runner.run_bash_step(&s).await.unwrap();
        assert_eq!(bash.seen.lock().unwrap()[0].cwd, PathBuf::from("/tmp"));
    }

    #[tokio::test]
    async fn bash_tool_without_command_never_spawns() {
        let (runner, bash) = runner(BashOutcome::default());
        let s = step(json!({ "id": "b", "type": "tool", "tool": "bash", "arguments": {} }));
        let err = runner.run_tool(&s, &ctx()).await.unwrap_err();
        assert!(matches!(err, StepError::BashMissingCommand));
        assert!(bash.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn passthrough_echoes_type_and_name() {
        let (runner, _) = runner(BashOutcome::default());
        let s = step(json!({ "id": "l", "type": "loop", "name": "retry" }));
        assert_eq!(s.kind, StepKind::Loop);
        assert_eq!(runner.run_passthrough(&s), json!({ "type": "loop", "name": "retry" }));
    }
}
