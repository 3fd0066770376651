use super::schema::{AppConfig, ConfigFile, Credentials, PartialConfig};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TRANSCRIPTION_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

impl ConfigFile {
    /// Flatten the sectioned file into a mergeable layer.
    pub fn to_partial(self) -> PartialConfig {
        let general = self.general;
        let chat = self.chat;
        let agent = self.agent;
        let transcription = self.transcription;

        let (model, workspace, subagent_root) = match general {
            Some(g) => (g.model, g.workspace.map(PathBuf::from), g.subagent_root.map(PathBuf::from)),
            None => (None, None, None),
        };
        let (owners, poll_timeout_secs) = match chat {
            Some(c) => (c.owners, c.poll_timeout_secs),
            None => (None, None),
        };
        let (transcription_endpoint, transcription_model) = match transcription {
            Some(t) => (t.endpoint, t.model),
            None => (None, None),
        };

        PartialConfig {
            model,
            workspace,
            subagent_root,
            owners,
            poll_timeout_secs,
            heartbeat_interval_secs: agent.as_ref().and_then(|a| a.heartbeat_interval_secs),
            watch_interval_secs: agent.as_ref().and_then(|a| a.watch_interval_secs),
            shell_timeout_secs: agent.as_ref().and_then(|a| a.shell_timeout_secs),
            subagent_timeout_secs: agent.as_ref().and_then(|a| a.subagent_timeout_secs),
            transcription_endpoint,
            transcription_model,
        }
    }
}

impl PartialConfig {
    /// Merge self with a lower-priority fallback.
    /// Self's non-None values take precedence; `owners` is replaced, not merged.
    pub fn with_fallback(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            model: self.model.or(fallback.model),
            workspace: self.workspace.or(fallback.workspace),
            subagent_root: self.subagent_root.or(fallback.subagent_root),
            owners: self.owners.or(fallback.owners),
            poll_timeout_secs: self.poll_timeout_secs.or(fallback.poll_timeout_secs),
            heartbeat_interval_secs: self
                .heartbeat_interval_secs
                .or(fallback.heartbeat_interval_secs),
            watch_interval_secs: self.watch_interval_secs.or(fallback.watch_interval_secs),
            shell_timeout_secs: self.shell_timeout_secs.or(fallback.shell_timeout_secs),
            subagent_timeout_secs: self.subagent_timeout_secs.or(fallback.subagent_timeout_secs),
            transcription_endpoint: self.transcription_endpoint.or(fallback.transcription_endpoint),
            transcription_model: self.transcription_model.or(fallback.transcription_model),
        }
    }

    /// Convert to AppConfig, filling any remaining gaps with defaults.
    pub fn finalize(self) -> AppConfig {
        let workspace = self
            .workspace
            .unwrap_or_else(|| PathBuf::from("./workspace"));
        let subagent_root = self
            .subagent_root
            .unwrap_or_else(|| default_subagent_root(&workspace));

        AppConfig {
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            workspace,
            subagent_root,
            owners: self.owners.unwrap_or_default(),
            poll_timeout_secs: self.poll_timeout_secs.unwrap_or(30),
            heartbeat_interval_secs: self.heartbeat_interval_secs.unwrap_or(1800),
            watch_interval_secs: self.watch_interval_secs.unwrap_or(5).max(1),
            shell_timeout_secs: self.shell_timeout_secs.unwrap_or(30),
            subagent_timeout_secs: self.subagent_timeout_secs.unwrap_or(1800).max(1),
            transcription_endpoint: self
                .transcription_endpoint
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_ENDPOINT.to_string()),
            transcription_model: self
                .transcription_model
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
        }
    }
}

/// Sibling `subagents/` directory next to the workspace.
fn default_subagent_root(workspace: &Path) -> PathBuf {
    match workspace.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("subagents"),
        _ => PathBuf::from("subagents"),
    }
}

impl Credentials {
    pub fn telegram_bot_token(&self) -> Result<&str, ConfigError> {
        self.telegram_bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingCredential("telegram_bot_token"))
    }
}
