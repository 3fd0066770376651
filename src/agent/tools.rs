//! Tool definitions and dispatch for the agent loop.
//!
//! Each tool declares a JSON schema for the model and a handler that takes
//! the raw arguments. [`ToolRegistry`] is the name -> handler table the loop
//! dispatches through.
//!
//! Tool failures never abort a turn: they come back to the model as a
//! [`ToolResult`] with `success: false` so it can react.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::exec::execute_shell;
use crate::llm::ToolDefinition;
use crate::orchestration::summary::truncate_chars;
use crate::orchestration::{LaunchRequest, Runner, SubAgentResult};
use crate::safety::WorkspaceGuard;
use crate::storage::atomic_write_async;
use crate::workspace::{provision_subagent_workspace, WorkspaceLoader};

/// Cap on file contents returned by `read_file`.
const MAX_READ_CHARS: usize = 50_000;

/// Upper bound for `spawn_subagent`'s `timeout_minutes`.
const MAX_SUBAGENT_MINUTES: u64 = 24 * 60;

/// Outcome of one tool call, sent back to the model as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({"success": false, "output": "", "error": e.to_string()}).to_string()
        })
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> anyhow::Result<String>;
}

/// What the agent loop needs from a tool set.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(&self, name: &str, args: Value) -> ToolResult;

    fn definitions(&self) -> Vec<ToolDefinition>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `shell_exec`, `read_file`, `write_file` and `list_dir`, all confined
    /// to the guard's workspace.
    pub fn standard(guard: Arc<WorkspaceGuard>, shell_timeout_secs: u64) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ShellExec {
            guard: guard.clone(),
            timeout_secs: shell_timeout_secs,
        }));
        registry.register(Arc::new(ReadFile {
            guard: guard.clone(),
        }));
        registry.register(Arc::new(WriteFile {
            guard: guard.clone(),
        }));
        registry.register(Arc::new(ListDir { guard }));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "Model requested unknown tool");
            return ToolResult::err(format!("unknown tool: {name}"));
        };

        tracing::debug!(tool = name, args = %args, "Executing tool");
        match tool.execute(args).await {
            Ok(output) => ToolResult::ok(output),
            Err(e) => {
                tracing::debug!(tool = name, error = %format!("{e:#}"), "Tool failed");
                ToolResult::err(format!("{e:#}"))
            }
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("missing or invalid '{key}' argument"))
}

// ─── shell_exec ─────────────────────────────────────────────────────────────

pub struct ShellExec {
    guard: Arc<WorkspaceGuard>,
    timeout_secs: u64,
}

#[async_trait]
impl Tool for ShellExec {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command via `sh -c` with the workspace as the working directory. \
         Returns JSON with stdout, stderr, exit_code and timed_out."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let command = required_str(&args, "command")?;
        let result = execute_shell(command, self.guard.canonical_root(), self.timeout_secs).await?;
        Ok(serde_json::to_string(&result)?)
    }
}

// ─── read_file / write_file / list_dir ─────────────────────────────────────

pub struct ReadFile {
    guard: Arc<WorkspaceGuard>,
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file inside the workspace. Paths are relative to the workspace root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let requested = required_str(&args, "path")?;
        let path = self.guard.resolve(requested)?;
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {requested}"))?;
        Ok(truncate_chars(&contents, MAX_READ_CHARS))
    }
}

pub struct WriteFile {
    guard: Arc<WorkspaceGuard>,
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a file inside the workspace, replacing it atomically. Parent directories \
         are created. Paths outside the workspace are rejected."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the workspace root"
                },
                "content": {
                    "type": "string",
                    "description": "Full new contents of the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let requested = required_str(&args, "path")?;
        let content = required_str(&args, "content")?;
        let path = self.guard.resolve(requested)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating parent directories for {requested}"))?;
        }
        atomic_write_async(path, content.as_bytes().to_vec(), 0o644)
            .await
            .with_context(|| format!("writing {requested}"))?;
        Ok(format!("wrote {} bytes to {requested}", content.len()))
    }
}

pub struct ListDir {
    guard: Arc<WorkspaceGuard>,
}

#[async_trait]
impl Tool for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a directory inside the workspace. Directories are suffixed with '/'. \
         Defaults to the workspace root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace root"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let requested = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = self.guard.resolve(requested)?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .with_context(|| format!("listing {requested}"))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();
        if names.is_empty() {
            return Ok("(empty)".to_string());
        }
        Ok(names.join("\n"))
    }
}

// ─── spawn_subagent ─────────────────────────────────────────────────────────

/// Fixed parameters for sub-agent launches.
#[derive(Debug, Clone)]
pub struct SubAgentSettings {
    /// Executable to run in `subagent` mode, normally the current binary.
    pub binary: PathBuf,
    /// Parent workspace whose persona and skills the sub-agent inherits.
    pub workspace_root: PathBuf,
    /// Directory that holds one isolated workspace per task.
    pub subagent_root: PathBuf,
    pub default_timeout: Duration,
    /// Model the parent runs on, forwarded as `--model`.
    pub model: Option<String>,
    pub config_path: Option<PathBuf>,
    pub credentials_path: Option<PathBuf>,
}

pub struct SpawnSubAgent {
    runner: Runner,
    results: mpsc::Sender<SubAgentResult>,
    cancel: CancellationToken,
    loader: Arc<dyn WorkspaceLoader>,
    settings: SubAgentSettings,
}

impl SpawnSubAgent {
    pub fn new(
        runner: Runner,
        results: mpsc::Sender<SubAgentResult>,
        cancel: CancellationToken,
        loader: Arc<dyn WorkspaceLoader>,
        settings: SubAgentSettings,
    ) -> Self {
        Self {
            runner,
            results,
            cancel,
            loader,
            settings,
        }
    }

    fn timeout_from(&self, args: &Value) -> anyhow::Result<Duration> {
        match args.get("timeout_minutes") {
            None | Some(Value::Null) => Ok(self.settings.default_timeout),
            Some(value) => {
                let minutes = value
                    .as_u64()
                    .context("'timeout_minutes' must be a positive integer")?;
                if minutes == 0 || minutes > MAX_SUBAGENT_MINUTES {
                    bail!("'timeout_minutes' must be between 1 and {MAX_SUBAGENT_MINUTES}");
                }
                Ok(Duration::from_secs(minutes * 60))
            }
        }
    }
}

fn new_task_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

#[async_trait]
impl Tool for SpawnSubAgent {
    fn name(&self) -> &str {
        "spawn_subagent"
    }

    fn description(&self) -> &str {
        "Delegate a long-running task to an isolated sub-agent. It works in its own \
         workspace with the same persona and skills; its result is sent to the owners \
         when it finishes. Only one sub-agent can run at a time."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Complete, self-contained description of the task"
                },
                "timeout_minutes": {
                    "type": "integer",
                    "description": "Time limit in minutes (optional)"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<String> {
        let task = required_str(&args, "task")?.trim();
        if task.is_empty() {
            bail!("'task' must not be empty");
        }
        let timeout = self.timeout_from(&args)?;
        if self.runner.is_active() {
            bail!("a sub-agent is already running; wait for its result");
        }

        let source = self.loader.load(&self.settings.workspace_root).await?;
        let task_id = new_task_id();
        let workspace = provision_subagent_workspace(
            &self.settings.subagent_root,
            &task_id,
            task,
            &source,
        )
        .await?;

        let request = LaunchRequest {
            binary: self.settings.binary.clone(),
            workspace: workspace.clone(),
            task_id: task_id.clone(),
            timeout,
            model: self.settings.model.clone(),
            config_path: self.settings.config_path.clone(),
            credentials_path: self.settings.credentials_path.clone(),
        };
        if let Err(e) = self.runner.launch(&self.cancel, request, self.results.clone()) {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&workspace).await {
                tracing::warn!(
                    workspace = %workspace.display(),
                    error = %cleanup,
                    "Failed to remove unused sub-agent workspace"
                );
            }
            return Err(e.into());
        }

        Ok(format!(
            "Sub-agent {task_id} started with a {} minute limit. Its result will be \
             delivered to the owners when it finishes.",
            timeout.as_secs() / 60
        ))
    }
}
