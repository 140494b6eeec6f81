//! Runner adapter: the seam to the analysis execution environment.
//!
//! The environment is external, slow, and allowed to be unreliable, so
//! the trait exposes explicit outcomes instead of letting failures
//! bubble through the scheduler. Callers wrap every method in
//! `tokio::time::timeout`; implementations should still not block
//! indefinitely on their own.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use uuid::Uuid;

use zoll_core::config::RunnerConfig;

use crate::task::Task;

// ── Seam types ───────────────────────────────────────────────────────

/// Observed state of one execution.
#[derive(Debug, Clone)]
pub enum PollStatus {
    Running,
    /// Analysis finished; the value is the report findings.
    Succeeded(Value),
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to start analyzer: {0}")]
    StartFailed(String),
    #[error("failed to stop execution {0}")]
    StopFailed(String),
    /// The handle is unknown or the environment cannot be reached.
    /// Not a task failure; the caller leaves the task for the timeout.
    #[error("execution {0} is unreachable")]
    Unreachable(String),
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Launch an analysis and return an opaque execution handle.
    async fn start(&self, task: &Task) -> Result<String, RunnerError>;

    /// Terminate the execution and release the handle. Succeeds if the
    /// execution already finished on its own; the handle is invalid
    /// afterwards either way.
    async fn stop(&self, handle: &str) -> Result<(), RunnerError>;

    /// Check on an execution. Must be idempotent until `stop` is
    /// called: polling after the execution exits keeps returning the
    /// same terminal result.
    async fn poll(&self, handle: &str) -> Result<PollStatus, RunnerError>;
}

// ── Subprocess sandbox ───────────────────────────────────────────────

/// Terminal result slot shared between the waiter task and `poll`.
type Outcome = Arc<Mutex<Option<PollStatus>>>;

struct Execution {
    kill: Option<oneshot::Sender<()>>,
    outcome: Outcome,
}

/// Runs each analysis as a child process of the configured analyzer
/// command. The child gets `--ecosystem/--package/--version` arguments
/// and is expected to print the report JSON on stdout and exit 0.
///
/// A waiter task per execution owns the child: it waits for exit (or a
/// kill signal from `stop`), drains stdout/stderr, and parks the
/// terminal [`PollStatus`] where `poll` can read it repeatedly.
pub struct SandboxRunner {
    config: RunnerConfig,
    executions: Mutex<HashMap<String, Execution>>,
}

impl SandboxRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            executions: Mutex::new(HashMap::new()),
        }
    }

    fn spawn_child(&self, task: &Task) -> std::io::Result<Child> {
        let mut cmd = Command::new(&self.config.command);
        cmd.arg("--ecosystem")
            .arg(task.coordinate.ecosystem.as_str())
            .arg("--package")
            .arg(&task.coordinate.name)
            .arg("--version")
            .arg(&task.coordinate.version)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &self.config.workdir {
            cmd.current_dir(workdir);
        }
        cmd.spawn()
    }
}

#[async_trait]
impl Runner for SandboxRunner {
    async fn start(&self, task: &Task) -> Result<String, RunnerError> {
        let mut child = self
            .spawn_child(task)
            .map_err(|e| RunnerError::StartFailed(format!("{}: {}", self.config.command, e)))?;

        let handle = Uuid::new_v4().to_string();
        let (kill_tx, kill_rx) = oneshot::channel();
        let outcome: Outcome = Arc::new(Mutex::new(None));

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tracing::info!(
            task_id = task.id,
            handle = %handle,
            command = %self.config.command,
            "analyzer started"
        );

        let waiter_outcome = outcome.clone();
        tokio::spawn(async move {
            let result = supervise(child, stdout, stderr, kill_rx).await;
            *waiter_outcome.lock().unwrap() = Some(result);
        });

        self.executions.lock().unwrap().insert(
            handle.clone(),
            Execution {
                kill: Some(kill_tx),
                outcome,
            },
        );
        Ok(handle)
    }

    async fn stop(&self, handle: &str) -> Result<(), RunnerError> {
        // The handle is done once it is stopped, so the whole record
        // goes; entries would otherwise pile up run after run.
        let execution = self.executions.lock().unwrap().remove(handle);
        match execution {
            Some(execution) => {
                // A closed channel means the waiter already finished;
                // stopping a finished execution succeeds.
                if let Some(kill) = execution.kill {
                    let _ = kill.send(());
                }
                Ok(())
            }
            None => Err(RunnerError::Unreachable(handle.to_string())),
        }
    }

    async fn poll(&self, handle: &str) -> Result<PollStatus, RunnerError> {
        let outcome = {
            let executions = self.executions.lock().unwrap();
            match executions.get(handle) {
                Some(exec) => exec.outcome.clone(),
                None => return Err(RunnerError::Unreachable(handle.to_string())),
            }
        };
        let result = outcome.lock().unwrap().clone();
        Ok(result.unwrap_or(PollStatus::Running))
    }
}

/// Wait for the child to exit (or be killed), then classify the result.
async fn supervise(
    mut child: Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    kill_rx: oneshot::Receiver<()>,
) -> PollStatus {
    // Drain pipes concurrently with the wait so a chatty child cannot
    // deadlock on a full pipe buffer.
    let out_reader = tokio::spawn(read_all(stdout));
    let err_reader = tokio::spawn(read_all(stderr));

    tokio::pin!(kill_rx);
    let (status, killed) = tokio::select! {
        status = child.wait() => (status, false),
        _ = &mut kill_rx => {
            let _ = child.start_kill();
            (child.wait().await, true)
        }
    };

    let out = out_reader.await.unwrap_or_default();
    let err = err_reader.await.unwrap_or_default();

    match status {
        _ if killed => PollStatus::Failed("analyzer stopped by scheduler".to_string()),
        Ok(status) if status.success() => match serde_json::from_slice::<Value>(&out) {
            Ok(findings) => PollStatus::Succeeded(findings),
            Err(e) => PollStatus::Failed(format!("analyzer produced invalid report JSON: {}", e)),
        },
        Ok(status) => PollStatus::Failed(format!(
            "analyzer exited with {}: {}",
            status,
            stderr_tail(&err)
        )),
        Err(e) => PollStatus::Failed(format!("failed waiting for analyzer: {}", e)),
    }
}

async fn read_all(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

/// Last few lines of stderr, enough for the failure details without
/// storing an entire build log.
fn stderr_tail(err: &[u8]) -> String {
    let text = String::from_utf8_lossy(err);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

// ── Tests ────────────────────────────────────────────────────────────
