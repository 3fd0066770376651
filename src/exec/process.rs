//! Process-group handles.
//!
//! Children are started as leaders of their own process group so a shutdown
//! reaches everything they spawned, not just the immediate child. The
//! [`ProcessHandle`] trait keeps the runner's two-stage shutdown logic free of
//! signal plumbing; [`GroupLauncher`] is the Unix implementation.

use std::ffi::OsString;
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

/// What to run and where.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

/// A started child process that can be waited on and signalled as a group.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id of the group leader, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Cancel-safe.
    async fn wait(&mut self) -> std::io::Result<ExitStatus>;

    /// Ask the whole group to exit (SIGTERM).
    fn terminate(&self) -> std::io::Result<()>;

    /// Forcefully kill the whole group (SIGKILL).
    fn kill(&self) -> std::io::Result<()>;
}

/// Starts processes. Injected into the runner so tests and other platforms
/// can substitute their own.
pub trait ProcessLauncher: Send + Sync {
    fn start(&self, spec: &ProcessSpec) -> std::io::Result<Box<dyn ProcessHandle>>;
}

/// Unix launcher: own process group, stdout and stderr both routed to this
/// process's stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupLauncher;

impl ProcessLauncher for GroupLauncher {
    fn start(&self, spec: &ProcessSpec) -> std::io::Result<Box<dyn ProcessHandle>> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(parent_stderr()?)
            .stderr(parent_stderr()?)
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn()?;
        let pgid = child.id().map(|pid| Pid::from_raw(pid as i32));
        Ok(Box::new(GroupProcess { child, pgid }))
    }
}

struct GroupProcess {
    child: Child,
    /// Captured at spawn; `Child::id` returns `None` once the leader is reaped.
    pgid: Option<Pid>,
}

#[async_trait]
impl ProcessHandle for GroupProcess {
    fn id(&self) -> Option<u32> {
        self.pgid.map(|p| p.as_raw() as u32)
    }

    async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    fn terminate(&self) -> std::io::Result<()> {
        signal_group(self.pgid, Signal::SIGTERM)
    }

    fn kill(&self) -> std::io::Result<()> {
        signal_group(self.pgid, Signal::SIGKILL)
    }
}

/// Send `signal` to a process group. A group that is already gone is not an error.
pub fn signal_group(pgid: Option<Pid>, signal: Signal) -> std::io::Result<()> {
    let Some(pgid) = pgid else {
        return Ok(());
    };
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL and reap.
pub async fn shutdown_gracefully(
    handle: &mut dyn ProcessHandle,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    if let Err(e) = handle.terminate() {
        tracing::warn!(pid = ?handle.id(), error = %e, "SIGTERM to process group failed");
    }
    let waited = tokio::time::timeout(grace, handle.wait()).await;
    match waited {
        Ok(status) => status,
        Err(_) => {
            tracing::warn!(pid = ?handle.id(), grace_secs = grace.as_secs(), "Process group ignored SIGTERM; killing");
            handle.kill()?;
            handle.wait().await
        }
    }
}

/// A fresh handle to this process's stderr, usable as a child's stdio.
fn parent_stderr() -> std::io::Result<Stdio> {
    let fd = std::io::stderr().as_fd().try_clone_to_owned()?;
    Ok(Stdio::from(fd))
}
