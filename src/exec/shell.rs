use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::process::signal_group;
use crate::error::ExecError;

/// How long to wait for the output pipes to drain after the process exits.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a shell command execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Run `command` through `sh -c` in `cwd`, capturing stdout and stderr.
///
/// The shell runs in its own process group; on timeout the whole group is
/// killed and the result is returned with `timed_out = true` and no exit code.
/// Dropping the future before it completes also kills the whole group.
pub async fn execute_shell(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
) -> Result<ExecResult, ExecError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

    let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
    let mut group = GroupKillGuard { pgid };
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::SpawnFailed("stdout not captured".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::SpawnFailed("stderr not captured".into()))?;
    let stdout_task = tokio::spawn(read_all(stdout));
    let stderr_task = tokio::spawn(read_all(stderr));

    let (exit_code, timed_out) =
        match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => return Err(ExecError::ProcessFailed(e.to_string())),
            Err(_) => {
                tracing::warn!(command, timeout_secs, "Shell command timed out; killing process group");
                if let Err(e) = signal_group(pgid, Signal::SIGKILL) {
                    tracing::warn!(error = %e, "Failed to kill process group");
                }
                let _ = child.wait().await;
                (None, true)
            }
        };

    let stdout = drain(stdout_task).await;
    let stderr = drain(stderr_task).await;
    group.disarm();

    Ok(ExecResult {
        stdout,
        stderr,
        exit_code,
        timed_out,
    })
}

/// SIGKILLs the shell's process group when dropped while armed. `kill_on_drop`
/// alone only reaches the shell itself, not what it started.
struct GroupKillGuard {
    pgid: Option<Pid>,
}

impl GroupKillGuard {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if self.pgid.is_some() {
            if let Err(e) = signal_group(self.pgid, Signal::SIGKILL) {
                tracing::warn!(error = %e, "Failed to kill abandoned shell process group");
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let _ = reader.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(output)) => output,
        _ => String::new(),
    }
}
