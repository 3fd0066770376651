//! The chat agent's event loop.
//!
//! One task owns the [`Agent`] and handles events strictly one at a time:
//!
//! 1. inbound chat messages run a turn (see [`Agent::handle_message`]);
//! 2. workspace change notifications reload the snapshot;
//! 3. heartbeat ticks hand the checklist to the heartbeat executor;
//! 4. sub-agent results are summarized and broadcast to the owners.
//!
//! Because nothing else touches history or the workspace snapshot, neither
//! needs a lock. A long turn delays later events; it never interleaves with
//! them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::heartbeat::HeartbeatExecutor;
use super::history::History;
use super::response::{parse_agent_response, ResponseKind};
use super::system_prompt::{build_system_prompt, PromptMode};
use super::tools::ToolDispatcher;
use super::turn::run_tool_loop;
use crate::chat::{broadcast, ChatId, InboundMessage, MessageSender, Transcriber, SEEN_REACTION};
use crate::llm::{LanguageModel, Message};
use crate::memory::{MemoryWriter, SOURCE_AGENT, SOURCE_OWNER, SOURCE_SUBAGENT};
use crate::orchestration::summary::summarize;
use crate::orchestration::SubAgentResult;
use crate::workspace::{Workspace, WorkspaceLoader};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything the loop talks to. `tools`, `transcriber` and `heartbeat` are
/// optional; without them the loop still works, just with less capability.
#[derive(Clone)]
pub struct AgentDeps {
    pub llm: Arc<dyn LanguageModel>,
    pub sender: Arc<dyn MessageSender>,
    pub memory: Arc<dyn MemoryWriter>,
    pub loader: Arc<dyn WorkspaceLoader>,
    pub tools: Option<Arc<dyn ToolDispatcher>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub heartbeat: Option<Arc<dyn HeartbeatExecutor>>,
}

/// Receiving ends of the loop's event sources.
pub struct AgentEvents {
    pub inbound: mpsc::Receiver<InboundMessage>,
    pub workspace_changes: mpsc::Receiver<()>,
    pub subagent_results: mpsc::Receiver<SubAgentResult>,
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct Agent {
    deps: AgentDeps,
    owners: Vec<ChatId>,
    workspace: Workspace,
    history: History,
    heartbeat_interval: Option<Duration>,
}

impl Agent {
    pub fn new(deps: AgentDeps, workspace: Workspace, owners: Vec<ChatId>) -> Self {
        Self {
            deps,
            owners,
            workspace,
            history: History::new(),
            heartbeat_interval: None,
        }
    }

    /// Enable heartbeat ticks. A zero interval leaves them disabled.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run until `cancel` fires. Cancellation is a clean return, not an error.
    pub async fn run(&mut self, cancel: CancellationToken, mut events: AgentEvents) {
        let mut heartbeat = self.heartbeat_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        tracing::info!(
            owners = self.owners.len(),
            tools = self.deps.tools.is_some(),
            voice = self.deps.transcriber.is_some(),
            heartbeat = ?self.heartbeat_interval,
            "Agent loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Agent loop stopping");
                    return;
                }
                Some(message) = events.inbound.recv() => self.handle_message(message).await,
                Some(()) = events.workspace_changes.recv() => self.reload_workspace().await,
                Some(result) = events.subagent_results.recv() => {
                    self.handle_subagent_result(result).await;
                }
                () = next_tick(&mut heartbeat) => self.heartbeat_tick().await,
            }
        }
    }

    /// Process one inbound message: zero or one reply.
    pub async fn handle_message(&mut self, inbound: InboundMessage) {
        let has_text = inbound
            .text
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let transcribable = inbound.voice.is_some() && self.deps.transcriber.is_some();
        if !has_text && !transcribable {
            if inbound.voice.is_some() {
                tracing::info!(chat_id = inbound.chat_id, "Ignoring voice note: no transcriber configured");
            }
            return;
        }

        if let Err(e) = self
            .deps
            .sender
            .react(inbound.chat_id, inbound.message_id, SEEN_REACTION)
            .await
        {
            tracing::debug!(error = %format!("{e:#}"), "Failed to acknowledge message");
        }

        let Some(text) = self.inbound_text(&inbound).await else {
            return;
        };
        self.remember(SOURCE_OWNER, &text).await;

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(self.system_prompt()));
        messages.extend(self.history.messages().cloned());
        messages.push(Message::user(text.clone()));

        let final_text = match run_tool_loop(
            self.deps.llm.as_ref(),
            self.deps.tools.as_deref(),
            messages,
        )
        .await
        {
            Ok(final_text) => final_text,
            Err(e) => {
                tracing::warn!(chat_id = inbound.chat_id, error = %e, "Turn aborted without a reply");
                return;
            }
        };

        let response = parse_agent_response(&final_text);
        match response.kind {
            ResponseKind::Message if response.content.trim().is_empty() => {
                tracing::warn!(chat_id = inbound.chat_id, "Model returned an empty message; not replying");
            }
            ResponseKind::Message => {
                if let Err(e) = self.deps.sender.send(inbound.chat_id, &response.content).await {
                    tracing::warn!(chat_id = inbound.chat_id, error = %format!("{e:#}"), "Failed to send reply");
                }
                self.remember(SOURCE_AGENT, &response.content).await;
                self.history
                    .push_exchange(Message::user(text), Message::assistant(response.to_json()));
            }
            kind => tracing::debug!(?kind, "Turn ended without a reply"),
        }
    }

    /// Summarize a finished sub-agent and tell every owner.
    pub async fn handle_subagent_result(&self, result: SubAgentResult) {
        tracing::info!(
            task_id = %result.task_id,
            timed_out = result.timed_out,
            failed = result.error.is_some(),
            "Sub-agent finished"
        );
        let summary = summarize(&result);
        self.remember(SOURCE_SUBAGENT, &summary).await;
        broadcast(self.deps.sender.as_ref(), &self.owners, &summary).await;
    }

    /// Swap in a fresh workspace snapshot; on failure keep the old one.
    pub async fn reload_workspace(&mut self) {
        match self.deps.loader.load(&self.workspace.root).await {
            Ok(workspace) => {
                tracing::info!(root = %workspace.root.display(), "Workspace reloaded");
                self.workspace = workspace;
            }
            Err(e) => tracing::warn!(error = %e, "Workspace reload failed; keeping previous snapshot"),
        }
    }

    async fn heartbeat_tick(&self) {
        let Some(heartbeat) = &self.deps.heartbeat else {
            return;
        };
        let Some(checklist) = self
            .workspace
            .checklist
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        else {
            tracing::debug!("Heartbeat skipped: no checklist");
            return;
        };
        if let Err(e) = heartbeat.execute(checklist).await {
            tracing::warn!(error = %format!("{e:#}"), "Heartbeat failed");
        }
    }

    async fn inbound_text(&self, inbound: &InboundMessage) -> Option<String> {
        if let Some(text) = inbound.text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.to_string());
        }
        let (voice, transcriber) = (inbound.voice.as_ref()?, self.deps.transcriber.as_ref()?);
        match transcriber.transcribe(voice).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::info!(chat_id = inbound.chat_id, "Voice note transcribed to nothing");
                None
            }
            Err(e) => {
                tracing::warn!(chat_id = inbound.chat_id, error = %format!("{e:#}"), "Transcription failed");
                None
            }
        }
    }

    fn system_prompt(&self) -> String {
        let definitions = self
            .deps
            .tools
            .as_ref()
            .map(|t| t.definitions())
            .unwrap_or_default();
        build_system_prompt(&self.workspace, &definitions, PromptMode::Chat)
    }

    async fn remember(&self, source: &str, text: &str) {
        if let Err(e) = self.deps.memory.write(source, text).await {
            tracing::warn!(source, error = %format!("{e:#}"), "Failed to write memory");
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
