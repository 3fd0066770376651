//! Single-flight sub-agent runner.
//!
//! [`Runner`] starts at most one sub-agent process at a time and reports its
//! outcome on a caller-supplied channel. A launch is rejected outright while
//! another is active; there is no queue.
//!
//! **Ordering:** the watcher task moves the runner back to
//! [`RunnerState::Idle`] and fires the completion signal *before* it sends the
//! result, so a new launch is accepted as soon as the previous one is known
//! to be done, whether or not the caller has drained the channel yet. The
//! result channel therefore needs capacity >= 1.
//!
//! **Shutdown:** when the deadline passes or the caller's token is cancelled,
//! the child's process group gets SIGTERM, then SIGKILL after
//! [`SHUTDOWN_GRACE`], so a cooperative sub-agent can still flush its result
//! file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::types::{LaunchRequest, SubAgentResult, RESULT_FILE};
use crate::error::RunnerError;
use crate::exec::process::shutdown_gracefully;
use crate::exec::{GroupLauncher, ProcessHandle, ProcessLauncher, ProcessSpec};
use crate::safety::{clean, validate_path};

/// Time a sub-agent gets between SIGTERM and SIGKILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runner lifecycle. `Active` carries the completion signal of the current run.
enum RunnerState {
    Idle,
    Active { completed: watch::Receiver<bool> },
}

#[derive(Clone)]
pub struct Runner {
    state: Arc<Mutex<RunnerState>>,
    launcher: Arc<dyn ProcessLauncher>,
    grace: Duration,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(Arc::new(GroupLauncher))
    }
}

impl Runner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RunnerState::Idle)),
            launcher,
            grace: SHUTDOWN_GRACE,
        }
    }

    /// Override the SIGTERM -> SIGKILL grace window.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Whether a sub-agent is currently running.
    pub fn is_active(&self) -> bool {
        matches!(*self.lock_state(), RunnerState::Active { .. })
    }

    /// Validate `request`, start the child and return immediately.
    ///
    /// The outcome arrives later on `results`, exactly once. `cancel` is the
    /// caller's token; the request's timeout is layered under it.
    pub fn launch(
        &self,
        cancel: &CancellationToken,
        request: LaunchRequest,
        results: mpsc::Sender<SubAgentResult>,
    ) -> Result<(), RunnerError> {
        let (completed_tx, completed_rx) = watch::channel(false);
        {
            let mut state = self.lock_state();
            if matches!(*state, RunnerState::Active { .. }) {
                return Err(RunnerError::AlreadyActive);
            }
            *state = RunnerState::Active {
                completed: completed_rx,
            };
        }

        let started = prepare(&request).and_then(|(workspace, spec)| {
            self.launcher
                .start(&spec)
                .map(|handle| (workspace, handle))
                .map_err(RunnerError::Spawn)
        });
        let (workspace, handle) = match started {
            Ok(started) => started,
            Err(e) => {
                *self.lock_state() = RunnerState::Idle;
                return Err(e);
            }
        };

        tracing::info!(
            task_id = %request.task_id,
            pid = ?handle.id(),
            workspace = %workspace.display(),
            timeout_secs = request.timeout.as_secs(),
            "Sub-agent started"
        );

        let watcher = Watcher {
            state: self.state.clone(),
            completed: completed_tx,
            results,
            task_id: request.task_id,
            workspace,
            deadline: Instant::now() + request.timeout,
            timeout: request.timeout,
            cancel: cancel.clone(),
            grace: self.grace,
        };
        tokio::spawn(watcher.run(handle));
        Ok(())
    }

    /// Block until the active run completes or `cancel` fires. Returns at once
    /// when nothing is active.
    pub async fn wait_for_completion(&self, cancel: &CancellationToken) {
        let mut completed = match &*self.lock_state() {
            RunnerState::Idle => return,
            RunnerState::Active { completed } => completed.clone(),
        };
        tokio::select! {
            _ = completed.wait_for(|done| *done) => {}
            _ = cancel.cancelled() => {}
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Check the request and build the child's command line.
///
/// Paths are made absolute because the child runs with the workspace as its
/// working directory.
fn prepare(request: &LaunchRequest) -> Result<(PathBuf, ProcessSpec), RunnerError> {
    if request.timeout.is_zero() {
        return Err(RunnerError::InvalidTimeout(request.timeout));
    }

    let metadata = std::fs::metadata(&request.workspace).map_err(|e| RunnerError::InvalidWorkspace {
        path: request.workspace.clone(),
        reason: e.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(RunnerError::InvalidWorkspace {
            path: request.workspace.clone(),
            reason: "not a directory".to_string(),
        });
    }

    let workspace = clean(&absolute(&request.workspace)?);
    let parent = workspace.parent().ok_or_else(|| RunnerError::InvalidWorkspace {
        path: workspace.clone(),
        reason: "has no parent directory".to_string(),
    })?;
    let workspace = validate_path(parent, &workspace)?;

    let mut args = vec![
        "subagent".into(),
        "--workspace".into(),
        workspace.clone().into_os_string(),
        "--task-id".into(),
        request.task_id.clone().into(),
    ];
    if let Some(model) = &request.model {
        args.push("--model".into());
        args.push(model.into());
    }
    if let Some(config) = &request.config_path {
        args.push("--config".into());
        args.push(absolute(config)?.into_os_string());
    }
    if let Some(credentials) = &request.credentials_path {
        args.push("--credentials".into());
        args.push(absolute(credentials)?.into_os_string());
    }

    let spec = ProcessSpec {
        program: request.binary.clone(),
        args,
        current_dir: Some(workspace.clone()),
    };
    Ok((workspace, spec))
}

fn absolute(path: &Path) -> Result<PathBuf, RunnerError> {
    std::path::absolute(path).map_err(|source| RunnerError::Absolute {
        path: path.to_path_buf(),
        source,
    })
}

/// Background task that owns one running child.
struct Watcher {
    state: Arc<Mutex<RunnerState>>,
    completed: watch::Sender<bool>,
    results: mpsc::Sender<SubAgentResult>,
    task_id: String,
    workspace: PathBuf,
    deadline: Instant,
    timeout: Duration,
    cancel: CancellationToken,
    grace: Duration,
}

enum Wake {
    Exited(std::io::Result<std::process::ExitStatus>),
    Deadline,
    Cancelled,
}

impl Watcher {
    async fn run(self, mut handle: Box<dyn ProcessHandle>) {
        let wake = tokio::select! {
            status = handle.wait() => Wake::Exited(status),
            _ = tokio::time::sleep_until(self.deadline) => Wake::Deadline,
            _ = self.cancel.cancelled() => Wake::Cancelled,
        };

        let (error, timed_out) = match wake {
            Wake::Exited(Ok(status)) if status.success() => (None, false),
            Wake::Exited(Ok(status)) => (Some(format!("sub-agent exited with {status}")), false),
            Wake::Exited(Err(e)) => (Some(format!("failed to wait for sub-agent: {e}")), false),
            Wake::Deadline => {
                tracing::warn!(task_id = %self.task_id, timeout_secs = self.timeout.as_secs(), "Sub-agent timed out; terminating");
                self.stop(handle.as_mut()).await;
                (None, true)
            }
            Wake::Cancelled => {
                tracing::info!(task_id = %self.task_id, "Sub-agent cancelled; terminating");
                self.stop(handle.as_mut()).await;
                (Some("sub-agent cancelled".to_string()), false)
            }
        };

        let result = SubAgentResult {
            task_id: self.task_id.clone(),
            workspace: self.workspace.clone(),
            result: read_result_file(&self.workspace, &self.task_id).await,
            error,
            timed_out,
        };

        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RunnerState::Idle;
        let _ = self.completed.send(true);

        tracing::info!(
            task_id = %result.task_id,
            timed_out = result.timed_out,
            failed = result.error.is_some(),
            has_result = result.result.is_some(),
            "Sub-agent finished"
        );
        if self.results.send(result).await.is_err() {
            tracing::warn!(task_id = %self.task_id, "Sub-agent result dropped: receiver closed");
        }
    }

    async fn stop(&self, handle: &mut dyn ProcessHandle) {
        if let Err(e) = shutdown_gracefully(handle, self.grace).await {
            tracing::warn!(task_id = %self.task_id, error = %e, "Failed to reap sub-agent");
        }
    }
}

/// Read the optional result file. Absence is normal; other failures are
/// logged and treated as "no result".
async fn read_result_file(workspace: &Path, task_id: &str) -> Option<String> {
    let path = workspace.join(RESULT_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(task_id, path = %path.display(), error = %e, "Failed to read sub-agent result file");
            None
        }
    }
}
