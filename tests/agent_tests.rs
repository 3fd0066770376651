//! End-to-end behavior of the agent loop, heartbeat and autonomous mode with
//! scripted collaborators.

use async_trait::async_trait;
use familiar::agent::{
    Agent, AgentDeps, AgentEvents, AutonomousAgent, Heartbeat, HeartbeatExecutor, ToolDispatcher,
    ToolResult, MAX_HISTORY, MAX_TOOL_ROUNDS,
};
use familiar::chat::{ChatId, InboundMessage, MessageSender, Transcriber, VoiceNote};
use familiar::error::{LlmError, TurnError, WorkspaceError};
use familiar::llm::{LanguageModel, Message, ModelResponse, ToolCallRequest, ToolDefinition};
use familiar::memory::MemoryWriter;
use familiar::orchestration::{SubAgentResult, RESULT_FILE};
use familiar::workspace::{Workspace, WorkspaceLoader};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ─── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedModel {
    responses: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    fallback: Option<ModelResponse>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Result<ModelResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    fn repeating(response: ModelResponse) -> Self {
        Self {
            fallback: Some(response),
            ..Default::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Request("script exhausted".to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(ChatId, String)>>,
    reactions: Mutex<Vec<(ChatId, i64, String)>>,
    failing: Vec<ChatId>,
}

impl RecordingSender {
    fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, chat_id: ChatId, text: &str) -> anyhow::Result<()> {
        if self.failing.contains(&chat_id) {
            anyhow::bail!("chat {chat_id} unreachable");
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn react(&self, chat_id: ChatId, message_id: i64, emoji: &str) -> anyhow::Result<()> {
        self.reactions
            .lock()
            .unwrap()
            .push((chat_id, message_id, emoji.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMemory {
    entries: Mutex<Vec<(String, String)>>,
}

impl RecordingMemory {
    fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl MemoryWriter for RecordingMemory {
    async fn write(&self, source: &str, text: &str) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .push((source.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTools {
    calls: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl ToolDispatcher for RecordingTools {
    async fn execute(&self, name: &str, args: Value) -> ToolResult {
        self.calls.lock().unwrap().push((name.to_string(), args));
        ToolResult::ok("data")
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "read_file".to_string(),
            description: "Read a file".to_string(),
            parameters: json!({"type": "object"}),
        }]
    }
}

/// Serves snapshots in order; errors once they run out.
struct QueuedLoader {
    snapshots: Mutex<VecDeque<Workspace>>,
}

#[async_trait]
impl WorkspaceLoader for QueuedLoader {
    async fn load(&self, root: &Path) -> Result<Workspace, WorkspaceError> {
        self.snapshots
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WorkspaceError::PersonaNotFound {
                path: root.join("SOUL.md"),
            })
    }
}

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _voice: &VoiceNote) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
struct RecordingHeartbeat {
    checklists: Mutex<Vec<String>>,
}

#[async_trait]
impl HeartbeatExecutor for RecordingHeartbeat {
    async fn execute(&self, checklist: &str) -> anyhow::Result<()> {
        self.checklists.lock().unwrap().push(checklist.to_string());
        Ok(())
    }
}

// ─── Helper ───────────────────────────────────────────────────────────

const OWNER: ChatId = 42;

fn workspace(root: &Path) -> Workspace {
    Workspace {
        root: root.to_path_buf(),
        persona: "You are a test familiar.".to_string(),
        mission: None,
        checklist: Some("- water the plants".to_string()),
        skills: Vec::new(),
    }
}

fn reply(kind: &str, content: &str) -> ModelResponse {
    ModelResponse::single(Message::assistant(
        json!({"type": kind, "content": content}).to_string(),
    ))
}

fn tool_call(id: &str, name: &str, args: Value) -> ModelResponse {
    ModelResponse::single(Message::assistant_tool_calls(
        "",
        vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args,
        }],
    ))
}

struct Harness {
    llm: Arc<ScriptedModel>,
    sender: Arc<RecordingSender>,
    memory: Arc<RecordingMemory>,
    tools: Arc<RecordingTools>,
    agent: Agent,
}

fn harness(llm: ScriptedModel, with_tools: bool) -> Harness {
    harness_with(llm, with_tools, RecordingSender::default(), vec![OWNER])
}

fn harness_with(
    llm: ScriptedModel,
    with_tools: bool,
    sender: RecordingSender,
    owners: Vec<ChatId>,
) -> Harness {
    let llm = Arc::new(llm);
    let sender = Arc::new(sender);
    let memory = Arc::new(RecordingMemory::default());
    let tools = Arc::new(RecordingTools::default());
    let deps = AgentDeps {
        llm: llm.clone(),
        sender: sender.clone(),
        memory: memory.clone(),
        loader: Arc::new(QueuedLoader {
            snapshots: Mutex::new(VecDeque::new()),
        }),
        tools: with_tools.then(|| tools.clone() as Arc<dyn ToolDispatcher>),
        transcriber: None,
        heartbeat: None,
    };
    let agent = Agent::new(deps, workspace(Path::new("/srv/familiar")), owners);
    Harness {
        llm,
        sender,
        memory,
        tools,
        agent,
    }
}

fn entry(source: &str, text: &str) -> (String, String) {
    (source.to_string(), text.to_string())
}

// ─── Turns ────────────────────────────────────────────────────────────

#[tokio::test]
async fn simple_message_gets_one_reply() {
    let mut h = harness(ScriptedModel::new(vec![Ok(reply("message", "hello"))]), true);

    h.agent.handle_message(InboundMessage::text(OWNER, 7, "hi")).await;

    assert_eq!(h.sender.sent(), vec![(OWNER, "hello".to_string())]);
    assert_eq!(
        h.memory.entries(),
        vec![entry("owner", "hi"), entry("agent", "hello")]
    );
    assert_eq!(h.agent.history().len(), 2);
    assert_eq!(
        h.sender.reactions.lock().unwrap().clone(),
        vec![(OWNER, 7, "👀".to_string())]
    );

    let calls = h.llm.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2, "system prompt + user message");
    assert!(calls[0][0].content.contains("You are a test familiar."));
    assert_eq!(calls[0][1].content, "hi");
}

#[tokio::test]
async fn tool_call_round_then_reply() {
    let mut h = harness(
        ScriptedModel::new(vec![
            Ok(tool_call("call-1", "read_file", json!({"path": "a.txt"}))),
            Ok(reply("message", "done")),
        ]),
        true,
    );

    h.agent.handle_message(InboundMessage::text(OWNER, 1, "read a.txt")).await;

    assert_eq!(h.llm.call_count(), 2);
    let tool_calls = h.tools.calls.lock().unwrap().clone();
    assert_eq!(tool_calls, vec![("read_file".to_string(), json!({"path": "a.txt"}))]);
    assert_eq!(h.sender.sent(), vec![(OWNER, "done".to_string())]);

    let second_call = &h.llm.calls.lock().unwrap()[1];
    let tool_message = second_call.last().unwrap();
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call-1"));
    let payload: Value = serde_json::from_str(&tool_message.content).unwrap();
    assert_eq!(payload, json!({"success": true, "output": "data", "error": null}));
}

#[tokio::test]
async fn exhausting_tool_rounds_sends_nothing() {
    let mut h = harness(
        ScriptedModel::repeating(tool_call("loop", "read_file", json!({"path": "a.txt"}))),
        true,
    );

    h.agent.handle_message(InboundMessage::text(OWNER, 1, "loop forever")).await;

    assert_eq!(h.llm.call_count(), MAX_TOOL_ROUNDS);
    assert_eq!(h.tools.calls.lock().unwrap().len(), MAX_TOOL_ROUNDS);
    assert!(h.sender.sent().is_empty());
    assert!(h.agent.history().is_empty());
}

#[tokio::test]
async fn model_failure_aborts_silently() {
    let mut h = harness(
        ScriptedModel::new(vec![Err(LlmError::RetriesExhausted {
            attempts: 3,
            message: "503".to_string(),
        })]),
        true,
    );

    h.agent.handle_message(InboundMessage::text(OWNER, 1, "hi")).await;

    assert!(h.sender.sent().is_empty());
    assert!(h.agent.history().is_empty());
    assert_eq!(h.memory.entries(), vec![entry("owner", "hi")]);
}

#[tokio::test]
async fn empty_choices_abort_silently() {
    let mut h = harness(ScriptedModel::new(vec![Ok(ModelResponse::default())]), true);
    h.agent.handle_message(InboundMessage::text(OWNER, 1, "hi")).await;
    assert!(h.sender.sent().is_empty());
    assert!(h.agent.history().is_empty());
}

#[tokio::test]
async fn tool_calls_without_tools_abort_silently() {
    let mut h = harness(
        ScriptedModel::new(vec![Ok(tool_call("c", "read_file", json!({})))]),
        false,
    );
    h.agent.handle_message(InboundMessage::text(OWNER, 1, "hi")).await;
    assert_eq!(h.llm.call_count(), 1);
    assert!(h.sender.sent().is_empty());
}

#[tokio::test]
async fn think_and_noop_are_silent() {
    let mut h = harness(
        ScriptedModel::new(vec![
            Ok(reply("think", "the owner seems busy")),
            Ok(reply("noop", "")),
        ]),
        false,
    );

    h.agent.handle_message(InboundMessage::text(OWNER, 1, "hm")).await;
    h.agent.handle_message(InboundMessage::text(OWNER, 2, "ok")).await;

    assert!(h.sender.sent().is_empty());
    assert!(h.agent.history().is_empty());
    assert_eq!(h.memory.entries(), vec![entry("owner", "hm"), entry("owner", "ok")]);
}

#[tokio::test]
async fn plain_text_answer_is_sent_verbatim() {
    let mut h = harness(
        ScriptedModel::new(vec![Ok(ModelResponse::single(Message::assistant(
            "Sure, on it.",
        )))]),
        false,
    );
    h.agent.handle_message(InboundMessage::text(OWNER, 1, "hi")).await;
    assert_eq!(h.sender.sent(), vec![(OWNER, "Sure, on it.".to_string())]);
}

#[tokio::test]
async fn history_is_carried_into_later_turns_and_capped() {
    let mut h = harness(ScriptedModel::repeating(reply("message", "ack")), false);

    for i in 0..25 {
        h.agent
            .handle_message(InboundMessage::text(OWNER, i, format!("msg {i}")))
            .await;
    }

    assert_eq!(h.agent.history().len(), MAX_HISTORY);
    let oldest = h.agent.history().messages().next().unwrap();
    assert_eq!(oldest.content, "msg 5");

    let calls = h.llm.calls.lock().unwrap();
    let last = calls.last().unwrap();
    assert_eq!(last.len(), 1 + MAX_HISTORY + 1);
}

#[tokio::test]
async fn blank_text_is_ignored() {
    let mut h = harness(ScriptedModel::default(), false);
    h.agent.handle_message(InboundMessage::text(OWNER, 1, "   ")).await;
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.sender.reactions.lock().unwrap().is_empty());
}

// ─── Voice ────────────────────────────────────────────────────────────

fn voice_message() -> InboundMessage {
    InboundMessage {
        chat_id: OWNER,
        message_id: 3,
        text: None,
        voice: Some(VoiceNote {
            file_id: "voice-1".to_string(),
            duration_secs: 2,
        }),
    }
}

#[tokio::test]
async fn voice_without_transcriber_is_ignored() {
    let mut h = harness(ScriptedModel::default(), false);
    h.agent.handle_message(voice_message()).await;
    assert_eq!(h.llm.call_count(), 0);
    assert!(h.sender.sent().is_empty());
}

#[tokio::test]
async fn voice_is_transcribed_into_a_turn() {
    let llm = Arc::new(ScriptedModel::new(vec![Ok(reply("message", "noted"))]));
    let sender = Arc::new(RecordingSender::default());
    let memory = Arc::new(RecordingMemory::default());
    let deps = AgentDeps {
        llm: llm.clone(),
        sender: sender.clone(),
        memory: memory.clone(),
        loader: Arc::new(QueuedLoader {
            snapshots: Mutex::new(VecDeque::new()),
        }),
        tools: None,
        transcriber: Some(Arc::new(FixedTranscriber("buy milk")) as Arc<dyn Transcriber>),
        heartbeat: None,
    };
    let mut agent = Agent::new(deps, workspace(Path::new("/srv/familiar")), vec![OWNER]);

    agent.handle_message(voice_message()).await;

    assert_eq!(llm.calls.lock().unwrap()[0][1].content, "buy milk");
    assert_eq!(sender.sent(), vec![(OWNER, "noted".to_string())]);
    assert_eq!(memory.entries()[0], entry("owner", "buy milk"));
}

// ─── Sub-agent results ────────────────────────────────────────────────

#[tokio::test]
async fn subagent_result_is_broadcast_to_every_owner() {
    let sender = RecordingSender {
        failing: vec![2],
        ..Default::default()
    };
    let h = harness_with(ScriptedModel::default(), false, sender, vec![1, 2, 3]);

    h.agent
        .handle_subagent_result(SubAgentResult {
            task_id: "t1".to_string(),
            workspace: PathBuf::from("/srv/subagents/t1"),
            result: Some("report ready".to_string()),
            error: None,
            timed_out: false,
        })
        .await;

    let sent = h.sender.sent();
    let recipients: Vec<ChatId> = sent.iter().map(|(id, _)| *id).collect();
    assert_eq!(recipients, vec![1, 3]);
    assert!(sent[0].1.contains("report ready"));
    assert_eq!(h.memory.entries()[0].0, "subagent");
}

#[tokio::test]
async fn timed_out_subagent_is_reported_as_such() {
    let h = harness(ScriptedModel::default(), false);
    h.agent
        .handle_subagent_result(SubAgentResult {
            task_id: "t2".to_string(),
            workspace: PathBuf::from("/srv/subagents/t2"),
            result: None,
            error: None,
            timed_out: true,
        })
        .await;
    assert!(h.sender.sent()[0].1.contains("timed out"));
}

// ─── Event loop ───────────────────────────────────────────────────────

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn run_loop_handles_events_and_stops_on_cancel() {
    let tmp = TempDir::new().unwrap();
    let mut updated = workspace(tmp.path());
    updated.persona = "You are the reloaded familiar.".to_string();

    let llm = Arc::new(ScriptedModel::repeating(reply("message", "hello")));
    let sender = Arc::new(RecordingSender::default());
    let heartbeat = Arc::new(RecordingHeartbeat::default());
    let deps = AgentDeps {
        llm: llm.clone(),
        sender: sender.clone(),
        memory: Arc::new(RecordingMemory::default()),
        loader: Arc::new(QueuedLoader {
            snapshots: Mutex::new(VecDeque::from([updated])),
        }),
        tools: None,
        transcriber: None,
        heartbeat: Some(heartbeat.clone() as Arc<dyn HeartbeatExecutor>),
    };
    let mut agent = Agent::new(deps, workspace(tmp.path()), vec![OWNER])
        .with_heartbeat_interval(Duration::from_millis(50));

    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let (changes_tx, changes_rx) = mpsc::channel(1);
    let (results_tx, results_rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        agent
            .run(
                loop_cancel,
                AgentEvents {
                    inbound: inbound_rx,
                    workspace_changes: changes_rx,
                    subagent_results: results_rx,
                },
            )
            .await;
        agent
    });

    inbound_tx.send(InboundMessage::text(OWNER, 1, "hi")).await.unwrap();
    eventually(|| sender.sent().len() == 1).await;

    changes_tx.send(()).await.unwrap();
    results_tx
        .send(SubAgentResult {
            task_id: "t3".to_string(),
            workspace: tmp.path().join("t3"),
            result: None,
            error: Some("boom".to_string()),
            timed_out: false,
        })
        .await
        .unwrap();
    eventually(|| sender.sent().len() == 2).await;
    eventually(|| !heartbeat.checklists.lock().unwrap().is_empty()).await;

    // A second change finds no snapshot; the loaded one must survive.
    changes_tx.send(()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    cancel.cancel();
    let agent = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop should stop on cancel")
        .unwrap();

    assert_eq!(agent.history().len(), 2);
    assert_eq!(agent.workspace().persona, "You are the reloaded familiar.");
    assert!(sender.sent()[1].1.contains("boom"));
    assert_eq!(
        heartbeat.checklists.lock().unwrap()[0],
        "- water the plants"
    );
}

// ─── Heartbeat ────────────────────────────────────────────────────────

fn heartbeat_with(
    llm: ScriptedModel,
    root: &Path,
) -> (Heartbeat, Arc<RecordingSender>, Arc<RecordingMemory>) {
    let sender = Arc::new(RecordingSender::default());
    let memory = Arc::new(RecordingMemory::default());
    let loader = Arc::new(QueuedLoader {
        snapshots: Mutex::new(VecDeque::from([workspace(root)])),
    });
    let heartbeat = Heartbeat::new(
        Arc::new(llm),
        sender.clone(),
        memory.clone(),
        loader,
        root.to_path_buf(),
        vec![1, 2],
    );
    (heartbeat, sender, memory)
}

#[tokio::test]
async fn heartbeat_message_is_logged_and_broadcast() {
    let tmp = TempDir::new().unwrap();
    let (heartbeat, sender, memory) = heartbeat_with(
        ScriptedModel::new(vec![Ok(reply("message", "Plants need water."))]),
        tmp.path(),
    );

    heartbeat.execute("- water the plants").await.unwrap();

    assert_eq!(
        sender.sent(),
        vec![
            (1, "Plants need water.".to_string()),
            (2, "Plants need water.".to_string())
        ]
    );
    assert_eq!(memory.entries(), vec![entry("heartbeat", "Plants need water.")]);
}

#[tokio::test]
async fn heartbeat_think_is_logged_but_silent() {
    let tmp = TempDir::new().unwrap();
    let (heartbeat, sender, memory) = heartbeat_with(
        ScriptedModel::new(vec![Ok(reply("think", "plants were watered yesterday"))]),
        tmp.path(),
    );

    heartbeat.execute("- water the plants").await.unwrap();

    assert!(sender.sent().is_empty());
    assert_eq!(
        memory.entries(),
        vec![entry("heartbeat", "plants were watered yesterday")]
    );
}

// ─── Autonomous mode ──────────────────────────────────────────────────

fn mission_workspace(root: &Path) -> Workspace {
    Workspace {
        mission: Some("Summarize the notes.".to_string()),
        ..workspace(root)
    }
}

#[tokio::test]
async fn autonomous_run_writes_result_file() {
    let tmp = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedModel::new(vec![
        Ok(tool_call("c1", "read_file", json!({"path": "notes.md"}))),
        Ok(reply("message", "Three notes, all about plants.")),
    ]));
    let tools = Arc::new(RecordingTools::default());
    let agent = AutonomousAgent::new(llm.clone()).with_tools(tools.clone());

    let path = agent.run(&mission_workspace(tmp.path())).await.unwrap();

    assert_eq!(path, Some(tmp.path().join(RESULT_FILE)));
    assert_eq!(
        std::fs::read_to_string(tmp.path().join(RESULT_FILE)).unwrap(),
        "Three notes, all about plants."
    );
    assert_eq!(llm.calls.lock().unwrap()[0][1].content, "Summarize the notes.");
    assert_eq!(tools.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn autonomous_round_exhaustion_is_a_hard_failure() {
    let tmp = TempDir::new().unwrap();
    let llm = Arc::new(ScriptedModel::repeating(tool_call("c", "read_file", json!({}))));
    let agent = AutonomousAgent::new(llm).with_tools(Arc::new(RecordingTools::default()));

    let err = agent.run(&mission_workspace(tmp.path())).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TurnError>(),
        Some(TurnError::RoundsExhausted(MAX_TOOL_ROUNDS))
    ));
    assert!(!tmp.path().join(RESULT_FILE).exists());
}

#[tokio::test]
async fn autonomous_requires_a_mission() {
    let tmp = TempDir::new().unwrap();
    let agent = AutonomousAgent::new(Arc::new(ScriptedModel::default()));
    let err = agent.run(&workspace(tmp.path())).await.unwrap_err();
    assert!(err.downcast_ref::<WorkspaceError>().is_some());
}
