//! Process-backed bash executor.
//!
//! Implements [`BashExecutor`] by spawning `bash -lc <command>` with
//! `tokio::process`. stdout and stderr are drained concurrently so a chatty
//! process cannot block on a full pipe. On Unix each command runs in its own
//! process group, and a timeout kills the whole group so subshells and
//! pipelines do not outlive the step. Anything still holding the pipes after
//! that gets a short grace period before its output is abandoned.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::{Duration, Instant};

use flowgate_core::workflow::bash::{BashExecutor, BashOutcome, BashRequest};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// How long to wait for the output readers once the process has exited.
const READER_GRACE: Duration = Duration::from_millis(500);

/// Runs bash steps as child processes of the current process.
#[derive(Debug, Clone)]
pub struct ProcessBashExecutor {
    shell: PathBuf,
}

impl ProcessBashExecutor {
    /// Executor using `bash` from `PATH`.
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("bash"),
        }
    }

    /// Executor using a specific shell binary (must accept `-lc`).
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    async fn run(&self, request: &BashRequest) -> std::io::Result<BashOutcome> {
        let start = Instant::now();

        let mut command = tokio::process::Command::new(&self.shell);
        command
            .arg("-lc")
            .arg(&request.command)
            .current_dir(&request.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn()?;
        let pid = child.id();

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let waited =
            tokio::time::timeout(Duration::from_millis(request.timeout_ms), child.wait()).await;
        let (exit_code, timed_out) = match waited {
            Ok(status) => {
                // Killed by a signal: no code to report.
                (Some(status?.code().unwrap_or(-1)), false)
            }
            Err(_) => {
                tracing::warn!(
                    command = %request.command,
                    timeout_ms = request.timeout_ms,
                    "Bash step timed out, killing process"
                );
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill timed-out bash process: {e}");
                }
                (None, true)
            }
        };

        let stdout = collect(stdout).await;
        let stderr = collect(stderr).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::debug!(
            command = %request.command,
            exit_code = exit_code.unwrap_or(-1),
            timed_out,
            duration_ms,
            "Bash step finished"
        );

        Ok(BashOutcome {
            exit_code,
            stdout,
            stderr,
            duration_ms,
            timed_out,
        })
    }
}

impl Default for ProcessBashExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl BashExecutor for ProcessBashExecutor {
    fn execute<'a>(
        &'a self,
        request: &'a BashRequest,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<BashOutcome>> + Send + 'a>> {
        Box::pin(self.run(request))
    }
}

/// Kill every process in the group led by `pid`.
#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let result = tokio::process::Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {}
        Ok(status) => tracing::debug!(pid, ?status, "kill on process group did not succeed"),
        Err(e) => tracing::warn!(pid, "Failed to kill process group: {e}"),
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error just ends capture early.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(mut reader: JoinHandle<String>) -> String {
    match tokio::time::timeout(READER_GRACE, &mut reader).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            reader.abort();
            String::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_core::workflow::bash::settle_bash;
    use flowgate_core::workflow::compiler::compile;
    use flowgate_core::workflow::executor::{WorkflowEngine, WorkflowExecutor};
    use flowgate_types::workflow::{RunPayload, RunStatus};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn request(command: &str, cwd: PathBuf, timeout_ms: u64) -> BashRequest {
        BashRequest {
            command: command.to_string(),
            cwd,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr_separately() {
        let tmp = TempDir::new().unwrap();
        let req = request("echo out; echo err >&2", tmp.path().to_path_buf(), 10_000);
        let outcome = ProcessBashExecutor::new().execute(&req).await.unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "out");
        assert_eq!(outcome.stderr.trim(), "err");
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn runs_in_the_requested_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), "here").unwrap();
        let req = request("cat marker.txt", tmp.path().to_path_buf(), 10_000);
        let outcome = ProcessBashExecutor::new().execute(&req).await.unwrap();
        assert_eq!(outcome.stdout, "here");
    }

    #[tokio::test]
    async fn reports_nonzero_exit() {
        let tmp = TempDir::new().unwrap();
        let req = request("exit 3", tmp.path().to_path_buf(), 10_000);
        let result = ProcessBashExecutor::new().execute(&req).await;
        let err = settle_bash(&req, result).unwrap_err();
        assert_eq!(err.to_string(), "bash_exit_code:3");
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let tmp = TempDir::new().unwrap();
        let req = request("sleep 10", tmp.path().to_path_buf(), 1_000);
        let started = Instant::now();
        let outcome = ProcessBashExecutor::new().execute(&req).await.unwrap();

        assert!(outcome.timed_out);
        assert!(outcome.exit_code.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        let err = settle_bash(&req, Ok(outcome)).unwrap_err();
        assert_eq!(err.to_string(), "bash_timeout:1000");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_subshells_too() {
        let tmp = TempDir::new().unwrap();
        let req = request(
            "(sleep 2; touch late.txt); true",
            tmp.path().to_path_buf(),
            1_000,
        );
        let outcome = ProcessBashExecutor::new().execute(&req).await.unwrap();
        assert!(outcome.timed_out);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!tmp.path().join("late.txt").exists());
    }

    #[tokio::test]
    async fn missing_cwd_is_a_spawn_failure() {
        let req = request("true", PathBuf::from("/definitely/not/here"), 10_000);
        let result = ProcessBashExecutor::new().execute(&req).await;
        assert!(result.is_err());
        let err = settle_bash(&req, result).unwrap_err();
        assert!(err.to_string().starts_with("bash_spawn_failed:"), "got: {err}");
    }

    #[tokio::test]
    async fn engine_runs_real_bash_steps() {
        let tmp = TempDir::new().unwrap();
        let raw = serde_json::json!({
            "steps": [{
                "id": "hello",
                "type": "tool",
                "tool": "bash",
                "arguments": { "command": "echo workflow-ok", "cwd": tmp.path().to_str().unwrap() }
            }]
        });
        let workflow = compile(&raw).workflow.unwrap();
        let engine = WorkflowEngine::new(Arc::new(ProcessBashExecutor::new()));

        let envelope = engine.run("exec-bash", &workflow, &RunPayload::default()).await;
        assert_eq!(envelope.status, RunStatus::Ok);
        let stdout = envelope.steps[0].output.as_ref().unwrap()["stdout"].as_str().unwrap();
        assert!(stdout.contains("workflow-ok"));
    }
}
