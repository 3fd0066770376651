//! Autonomous (sub-agent) mode.
//!
//! Same turn as the chat loop, but the user message is the workspace mission,
//! there is nobody to reply to, and the final `message` is written to
//! `RESULT.md` with the atomic writer. Any failure, including running out of
//! tool rounds, is returned so the process exits non-zero and the parent's
//! runner reports it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use super::response::{parse_agent_response, ResponseKind};
use super::system_prompt::{build_system_prompt, PromptMode};
use super::tools::ToolDispatcher;
use super::turn::run_tool_loop;
use crate::llm::{LanguageModel, Message};
use crate::memory::{MemoryWriter, SOURCE_AGENT, SOURCE_OWNER};
use crate::orchestration::RESULT_FILE;
use crate::storage::atomic_write_async;
use crate::workspace::Workspace;

pub struct AutonomousAgent {
    llm: Arc<dyn LanguageModel>,
    tools: Option<Arc<dyn ToolDispatcher>>,
    memory: Option<Arc<dyn MemoryWriter>>,
}

impl AutonomousAgent {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            tools: None,
            memory: None,
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolDispatcher>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryWriter>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Work the mission once. Returns the result file path, or `None` when
    /// the model chose `think`/`noop` and there is nothing to report.
    pub async fn run(&self, workspace: &Workspace) -> anyhow::Result<Option<PathBuf>> {
        let mission = workspace.require_mission()?;
        self.remember(SOURCE_OWNER, mission).await;

        let definitions = self
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();
        let messages = vec![
            Message::system(build_system_prompt(
                workspace,
                &definitions,
                PromptMode::Autonomous,
            )),
            Message::user(mission),
        ];

        let text = run_tool_loop(self.llm.as_ref(), self.tools.as_deref(), messages).await?;
        let response = parse_agent_response(&text);
        if response.kind != ResponseKind::Message {
            tracing::info!(kind = ?response.kind, "Mission ended without a result");
            return Ok(None);
        }

        self.remember(SOURCE_AGENT, &response.content).await;
        let path = workspace.root.join(RESULT_FILE);
        atomic_write_async(path.clone(), response.content.into_bytes(), 0o644)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Result written");
        Ok(Some(path))
    }

    async fn remember(&self, source: &str, text: &str) {
        let Some(memory) = &self.memory else {
            return;
        };
        if let Err(e) = memory.write(source, text).await {
            tracing::warn!(source, error = %format!("{e:#}"), "Failed to write memory");
        }
    }
}
