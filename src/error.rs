use std::path::PathBuf;
use std::time::Duration;

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config at {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Missing credential `{0}`")]
    MissingCredential(&'static str),
}

/// Errors from the path guard.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("Path `{path}` is outside `{root}`")]
    OutOfBounds { path: PathBuf, root: PathBuf },

    #[error("Failed to resolve `{path}`: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to shell command execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn shell process: {0}")]
    SpawnFailed(String),

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors returned by a language model client.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

/// Reasons a single turn ended without a final response.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("model returned no choices")]
    NoChoices,

    #[error("model requested tools but no tool executor is configured")]
    ToolsUnavailable,

    #[error("model still requesting tools after {0} rounds")]
    RoundsExhausted(usize),
}

/// Errors returned synchronously by `Runner::launch`.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("a sub-agent is already active")]
    AlreadyActive,

    #[error("sub-agent workspace `{path}` is invalid: {reason}")]
    InvalidWorkspace { path: PathBuf, reason: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("failed to resolve `{path}`: {source}")]
    Absolute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start sub-agent: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("invalid sub-agent timeout {0:?}")]
    InvalidTimeout(Duration),
}

/// Errors loading a workspace snapshot.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Persona file not found at {path}")]
    PersonaNotFound { path: PathBuf },

    #[error("Mission file not found at {path}")]
    MissionNotFound { path: PathBuf },

    #[error("Workspace I/O error: {0}")]
    Io(#[from] std::io::Error),
}
