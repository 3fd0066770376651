//! Type definitions shared by the runner, the spawn tool and the agent loop.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Identifier of one sub-agent task (`YYYYmmdd-HHMMSS-xxxxxxxx`).
pub type TaskId = String;

/// File a sub-agent writes its final answer to, relative to its workspace.
pub const RESULT_FILE: &str = "RESULT.md";

/// Everything needed to start one sub-agent. Consumed by a single launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Executable to run; normally the current binary.
    pub binary: PathBuf,
    /// Isolated workspace directory prepared for this task.
    pub workspace: PathBuf,
    pub task_id: TaskId,
    pub timeout: Duration,
    /// Model the parent resolved; the child would otherwise fall back to its
    /// own config layers.
    pub model: Option<String>,
    /// Shared config file handed to the child, if any.
    pub config_path: Option<PathBuf>,
    /// Shared credentials file handed to the child, if any.
    pub credentials_path: Option<PathBuf>,
}

/// Terminal outcome of one sub-agent run. Produced once per successful
/// launch and never mutated after it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubAgentResult {
    pub task_id: TaskId,
    pub workspace: PathBuf,
    /// Contents of the result file, if the sub-agent wrote one.
    pub result: Option<String>,
    /// Why the run failed, if it did (not set for timeouts).
    pub error: Option<String>,
    pub timed_out: bool,
}
