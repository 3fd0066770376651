//! Periodic checklist review.
//!
//! On each heartbeat tick the loop hands the workspace checklist
//! (`HEARTBEAT.md`) to a [`HeartbeatExecutor`]. [`Heartbeat`] runs one
//! history-free turn over it: a `message` is logged and broadcast to the
//! owners, `think`/`noop` are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::response::{parse_agent_response, ResponseKind};
use super::system_prompt::{build_system_prompt, PromptMode};
use super::tools::ToolDispatcher;
use super::turn::run_tool_loop;
use crate::chat::{broadcast, ChatId, MessageSender};
use crate::llm::{LanguageModel, Message};
use crate::memory::{MemoryWriter, SOURCE_HEARTBEAT};
use crate::workspace::WorkspaceLoader;

#[async_trait]
pub trait HeartbeatExecutor: Send + Sync {
    async fn execute(&self, checklist: &str) -> anyhow::Result<()>;
}

pub struct Heartbeat {
    llm: Arc<dyn LanguageModel>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    sender: Arc<dyn MessageSender>,
    memory: Arc<dyn MemoryWriter>,
    loader: Arc<dyn WorkspaceLoader>,
    workspace_root: PathBuf,
    owners: Vec<ChatId>,
}

impl Heartbeat {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        sender: Arc<dyn MessageSender>,
        memory: Arc<dyn MemoryWriter>,
        loader: Arc<dyn WorkspaceLoader>,
        workspace_root: PathBuf,
        owners: Vec<ChatId>,
    ) -> Self {
        Self {
            llm,
            tools: None,
            sender,
            memory,
            loader,
            workspace_root,
            owners,
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatcher>) -> Self {
        self.tools = Some(tools);
        self
    }

    async fn remember(&self, text: &str) {
        if let Err(e) = self.memory.write(SOURCE_HEARTBEAT, text).await {
            tracing::warn!(error = %format!("{e:#}"), "Failed to record heartbeat in memory");
        }
    }
}

fn heartbeat_prompt(checklist: &str) -> String {
    format!(
        "Heartbeat check. Go through the checklist below and decide whether anything \
         needs your owner's attention right now. Reply with a `message` only if the \
         owner should be told something now. Use `think` to note observations and \
         `noop` when there is nothing to do.\n\n---\n\n{}",
        checklist.trim()
    )
}

#[async_trait]
impl HeartbeatExecutor for Heartbeat {
    async fn execute(&self, checklist: &str) -> anyhow::Result<()> {
        let workspace = self.loader.load(&self.workspace_root).await?;
        let definitions = self
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();

        let messages = vec![
            Message::system(build_system_prompt(&workspace, &definitions, PromptMode::Chat)),
            Message::user(heartbeat_prompt(checklist)),
        ];
        let text = run_tool_loop(self.llm.as_ref(), self.tools.as_deref(), messages).await?;
        let response = parse_agent_response(&text);

        match response.kind {
            ResponseKind::Message if !response.content.trim().is_empty() => {
                tracing::info!("Heartbeat produced a message for the owners");
                self.remember(&response.content).await;
                broadcast(self.sender.as_ref(), &self.owners, &response.content).await;
            }
            kind => {
                tracing::debug!(?kind, "Heartbeat stayed silent");
                if !response.content.trim().is_empty() {
                    self.remember(&response.content).await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_checklist() {
        let prompt = heartbeat_prompt("- water the plants\n");
        assert!(prompt.starts_with("Heartbeat check."));
        assert!(prompt.ends_with("- water the plants"));
    }
}
