//! Bash step argument normalization and the executor port.
//!
//! The engine never spawns processes itself. It normalizes a step's
//! `{command, cwd?, timeoutMs?}` arguments into a [`BashRequest`], hands it to
//! a [`BashExecutor`] implementation (the process-backed one lives in
//! `flowgate-infra`), and turns the [`BashOutcome`] into a step result.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use flowgate_types::config::clamp_bash_timeout_ms;
use serde_json::{Value, json};

use super::step_runner::StepError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum characters kept from each of stdout and stderr.
pub const MAX_CAPTURED_CHARS: usize = 64_000;

/// Marker appended to captured output that was cut short.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// A normalized bash invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BashRequest {
    /// Trimmed, non-empty command line passed to `bash -lc`.
    pub command: String,
    pub cwd: PathBuf,
    /// Already clamped to the permitted range.
    pub timeout_ms: u64,
}

impl BashRequest {
    /// Build a request from a step's argument object.
    ///
    /// Fails with `workflow_tool_bash_missing_command` when `command` is
    /// absent, not a string, or blank. `cwd` falls back to `default_cwd` and
    /// `timeoutMs` to `default_timeout_ms`; the timeout is clamped either way.
    pub fn from_arguments(
        arguments: Option<&Value>,
        default_cwd: &Path,
        default_timeout_ms: u64,
    ) -> Result<Self, StepError> {
        let args = arguments.and_then(Value::as_object);
        let command = args
            .and_then(|a| a.get("command"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(StepError::BashMissingCommand)?;

        let cwd = args
            .and_then(|a| a.get("cwd"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cwd.to_path_buf());

        let timeout_ms = args
            .and_then(|a| a.get("timeoutMs"))
            .and_then(Value::as_f64)
            .filter(|t| t.is_finite())
            .map(|t| t.max(0.0) as u64)
            .unwrap_or(default_timeout_ms);

        Ok(Self {
            command: command.to_string(),
            cwd,
            timeout_ms: clamp_bash_timeout_ms(timeout_ms),
        })
    }
}

/// What a finished (or killed) process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BashOutcome {
    /// `None` when the process was killed before reporting a code.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

// ---------------------------------------------------------------------------
// Executor port
// ---------------------------------------------------------------------------

/// Runs bash requests. Object-safe so the engine can hold `Arc<dyn BashExecutor>`.
///
/// An `Err` means the process could not be spawned at all; timeouts and
/// non-zero exits are reported through [`BashOutcome`].
pub trait BashExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a BashRequest,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<BashOutcome>> + Send + 'a>>;
}

/// Cut `text` to [`MAX_CAPTURED_CHARS`] characters, appending the marker if
/// anything was dropped.
pub fn truncate_output(text: &str) -> String {
    match text.char_indices().nth(MAX_CAPTURED_CHARS) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// The diagnostic output object recorded for every bash step.
pub fn bash_output(request: &BashRequest, outcome: &BashOutcome) -> Value {
    json!({
        "tool": "bash",
        "command": request.command,
        "cwd": request.cwd.display().to_string(),
        "timeoutMs": request.timeout_ms,
        "durationMs": outcome.duration_ms,
        "exitCode": outcome.exit_code,
        "stdout": truncate_output(&outcome.stdout),
        "stderr": truncate_output(&outcome.stderr),
    })
}

/// Interpret an executor result as a step result.
pub fn settle_bash(
    request: &BashRequest,
    result: std::io::Result<BashOutcome>,
) -> Result<Value, StepError> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            return Err(StepError::BashSpawnFailed {
                reason: e.to_string(),
                output: bash_output(request, &BashOutcome::default()),
            });
        }
    };

    let output = bash_output(request, &outcome);
    if outcome.timed_out {
        return Err(StepError::BashTimeout {
            timeout_ms: request.timeout_ms,
            output,
        });
    }
    match outcome.exit_code {
        Some(0) => Ok(output),
        Some(code) => Err(StepError::BashExitCode { code, output }),
        None => Err(StepError::BashExitCode { code: -1, output }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_types::config::{DEFAULT_BASH_TIMEOUT_MS, MAX_BASH_TIMEOUT_MS, MIN_BASH_TIMEOUT_MS};

    fn request(args: Value) -> Result<BashRequest, StepError> {
        BashRequest::from_arguments(Some(&args), Path::new("/work"), DEFAULT_BASH_TIMEOUT_MS)
    }

    #[test]
    fn missing_or_blank_command_is_rejected() {
        for args in [json!({}), json!({ "command": "   " }), json!({ "command": 7 })] {
            let err = request(args).unwrap_err();
            assert_eq!(err.to_string(), "workflow_tool_bash_missing_command");
        }
        let err = BashRequest::from_arguments(None, Path::new("/"), 1000).unwrap_err();
        assert!(matches!(err, StepError::BashMissingCommand));
    }

    #[test]
    fn defaults_and_trimming() {
        let req = request(json!({ "command": "  echo hi  " })).unwrap();
        assert_eq!(req.command, "echo hi");
        assert_eq!(req.cwd, PathBuf::from("/work"));
        assert_eq!(req.timeout_ms, DEFAULT_BASH_TIMEOUT_MS);

        let req = request(json!({ "command": "ls", "cwd": "/tmp" })).unwrap();
        assert_eq!(req.cwd, PathBuf::from("/tmp"));
    }

    #[test]
    fn timeout_is_clamped() {
        let low = request(json!({ "command": "true", "timeoutMs": 5 })).unwrap();
        assert_eq!(low.timeout_ms, MIN_BASH_TIMEOUT_MS);
        let high = request(json!({ "command": "true", "timeoutMs": 9_000_000 })).unwrap();
        assert_eq!(high.timeout_ms, MAX_BASH_TIMEOUT_MS);
        let odd = request(json!({ "command": "true", "timeoutMs": "fast" })).unwrap();
        assert_eq!(odd.timeout_ms, DEFAULT_BASH_TIMEOUT_MS);
    }

    #[test]
    fn truncation_marks_long_output() {
        let short = "x".repeat(10);
        assert_eq!(truncate_output(&short), short);

        let long = "é".repeat(MAX_CAPTURED_CHARS + 5);
        let cut = truncate_output(&long);
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), MAX_CAPTURED_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn settle_maps_outcomes_to_errors() {
        let req = request(json!({ "command": "make" })).unwrap();

        let ok = settle_bash(
            &req,
            Ok(BashOutcome { exit_code: Some(0), stdout: "done\n".into(), ..Default::default() }),
        )
        .unwrap();
        assert_eq!(ok["tool"], "bash");
        assert_eq!(ok["exitCode"], 0);
        assert_eq!(ok["cwd"], "/work");

        let err = settle_bash(&req, Ok(BashOutcome { exit_code: Some(3), ..Default::default() }))
            .unwrap_err();
        assert_eq!(err.to_string(), "bash_exit_code:3");
        assert_eq!(err.output().unwrap()["exitCode"], 3);

        let err = settle_bash(&req, Ok(BashOutcome { timed_out: true, ..Default::default() }))
            .unwrap_err();
        assert_eq!(err.to_string(), format!("bash_timeout:{DEFAULT_BASH_TIMEOUT_MS}"));
        assert!(err.output().unwrap()["exitCode"].is_null());

        let err = settle_bash(
            &req,
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no bash")),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "bash_spawn_failed:no bash");
    }
}
