use serde::Deserialize;
use std::path::PathBuf;

/// The TOML file structure for familiar.toml.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub general: Option<GeneralConfig>,
    pub chat: Option<ChatConfig>,
    pub agent: Option<AgentConfig>,
    pub transcription: Option<TranscriptionConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub model: Option<String>,
    pub workspace: Option<String>,
    pub subagent_root: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatConfig {
    /// Chat ids allowed to talk to the agent; they also receive broadcasts.
    pub owners: Option<Vec<i64>>,
    pub poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// 0 disables the heartbeat.
    pub heartbeat_interval_secs: Option<u64>,
    pub watch_interval_secs: Option<u64>,
    pub shell_timeout_secs: Option<u64>,
    pub subagent_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

/// Secrets, kept out of familiar.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub telegram_bot_token: Option<String>,
    pub transcription_api_key: Option<String>,
}

/// Fully-resolved runtime configuration. All fields have values.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: String,
    pub workspace: PathBuf,
    pub subagent_root: PathBuf,
    pub owners: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub watch_interval_secs: u64,
    pub shell_timeout_secs: u64,
    pub subagent_timeout_secs: u64,
    pub transcription_endpoint: String,
    pub transcription_model: String,
}

/// Partial config used during merge. All fields are Option so that
/// missing fields don't override lower-priority values.
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub model: Option<String>,
    pub workspace: Option<PathBuf>,
    pub subagent_root: Option<PathBuf>,
    pub owners: Option<Vec<i64>>,
    pub poll_timeout_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub watch_interval_secs: Option<u64>,
    pub shell_timeout_secs: Option<u64>,
    pub subagent_timeout_secs: Option<u64>,
    pub transcription_endpoint: Option<String>,
    pub transcription_model: Option<String>,
}
