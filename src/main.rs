use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use familiar::agent::{
    Agent, AgentDeps, AgentEvents, AutonomousAgent, Heartbeat, HeartbeatExecutor, SpawnSubAgent,
    SubAgentSettings, ToolDispatcher, ToolRegistry,
};
use familiar::chat::telegram::TelegramClient;
use familiar::chat::transcribe::HttpTranscriber;
use familiar::chat::{MessageSender, Transcriber};
use familiar::cli::{Cli, Commands};
use familiar::config::{self, AppConfig};
use familiar::llm::{GenaiModel, LanguageModel};
use familiar::memory::{DailyMemory, MemoryWriter};
use familiar::orchestration::Runner;
use familiar::safety::WorkspaceGuard;
use familiar::workspace::{watcher, FsWorkspaceLoader, WorkspaceLoader};

/// How long shutdown waits for a running sub-agent after cancelling it.
const SUBAGENT_SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so sub-agent output interleaves with the parent's.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    let credentials_path = config::credentials_path(&cli);
    tracing::info!(model = %config.model, workspace = %config.workspace.display(), "Config loaded");

    match &cli.command {
        Commands::Run { .. } => {
            let config_path = cli.command.config_path().cloned();
            run_chat(config, config_path, credentials_path).await
        }
        Commands::Subagent { task_id, .. } => {
            let span = tracing::info_span!("subagent", task_id = %task_id);
            run_subagent(config).instrument(span).await
        }
    }
}

async fn run_chat(
    config: AppConfig,
    config_path: Option<PathBuf>,
    credentials_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let credentials = config::load_credentials(credentials_path.as_deref())?;
    let telegram = Arc::new(TelegramClient::new(credentials.telegram_bot_token()?));

    let guard = Arc::new(WorkspaceGuard::new(&config.workspace).with_context(|| {
        format!("Failed to open workspace {}", config.workspace.display())
    })?);
    let root = guard.canonical_root().to_path_buf();
    let loader: Arc<dyn WorkspaceLoader> = Arc::new(FsWorkspaceLoader);
    let workspace = loader.load(&root).await?;

    if config.owners.is_empty() {
        tracing::warn!("No owners configured: every inbound message will be ignored");
    }

    let cancel = CancellationToken::new();
    let runner = Runner::default();
    let (result_tx, result_rx) = mpsc::channel(4);

    let llm: Arc<dyn LanguageModel> = Arc::new(GenaiModel::new(config.model.clone()));
    let sender: Arc<dyn MessageSender> = telegram.clone();
    let memory: Arc<dyn MemoryWriter> = Arc::new(DailyMemory::new(&root));

    let mut registry = ToolRegistry::standard(guard.clone(), config.shell_timeout_secs);
    registry.register(Arc::new(SpawnSubAgent::new(
        runner.clone(),
        result_tx,
        cancel.clone(),
        loader.clone(),
        SubAgentSettings {
            binary: std::env::current_exe().context("Failed to locate the current executable")?,
            workspace_root: root.clone(),
            subagent_root: config.subagent_root.clone(),
            default_timeout: Duration::from_secs(config.subagent_timeout_secs),
            model: Some(config.model.clone()),
            config_path,
            credentials_path,
        },
    )));
    let tools: Arc<dyn ToolDispatcher> = Arc::new(registry);

    let transcriber = credentials.transcription_api_key.clone().map(|key| {
        Arc::new(HttpTranscriber::new(
            config.transcription_endpoint.clone(),
            config.transcription_model.clone(),
            key,
            telegram.clone(),
        )) as Arc<dyn Transcriber>
    });

    let heartbeat: Arc<dyn HeartbeatExecutor> = Arc::new(
        Heartbeat::new(
            llm.clone(),
            sender.clone(),
            memory.clone(),
            loader.clone(),
            root.clone(),
            config.owners.clone(),
        )
        .with_tools(tools.clone()),
    );

    let deps = AgentDeps {
        llm,
        sender,
        memory,
        loader,
        tools: Some(tools),
        transcriber,
        heartbeat: Some(heartbeat),
    };

    let (inbound_tx, inbound_rx) = mpsc::channel(32);
    let (changes_tx, changes_rx) = mpsc::channel(1);

    let poller = telegram.clone();
    let owners = config.owners.clone();
    let poll_timeout = config.poll_timeout_secs;
    let poll_cancel = cancel.clone();
    tokio::spawn(async move {
        poller
            .poll_updates(&owners, poll_timeout, poll_cancel, inbound_tx)
            .await;
    });

    tokio::spawn(watcher::watch(
        root.clone(),
        Duration::from_secs(config.watch_interval_secs),
        cancel.clone(),
        changes_tx,
    ));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        signal_cancel.cancel();
    });

    tracing::info!(workspace = %root.display(), "familiar is running");
    let mut agent = Agent::new(deps, workspace, config.owners.clone())
        .with_heartbeat_interval(Duration::from_secs(config.heartbeat_interval_secs));
    agent
        .run(
            cancel.clone(),
            AgentEvents {
                inbound: inbound_rx,
                workspace_changes: changes_rx,
                subagent_results: result_rx,
            },
        )
        .await;

    if runner.is_active() {
        tracing::info!("Waiting for the running sub-agent to stop");
        let never = CancellationToken::new();
        let wait = runner.wait_for_completion(&never);
        if tokio::time::timeout(SUBAGENT_SHUTDOWN_WAIT, wait).await.is_err() {
            tracing::warn!("Sub-agent did not stop in time");
        }
    }

    tracing::info!("familiar stopped");
    Ok(())
}

async fn run_subagent(config: AppConfig) -> anyhow::Result<()> {
    let guard = Arc::new(WorkspaceGuard::new(&config.workspace).with_context(|| {
        format!("Failed to open workspace {}", config.workspace.display())
    })?);
    let root = guard.canonical_root().to_path_buf();
    let workspace = FsWorkspaceLoader.load(&root).await?;

    let agent = AutonomousAgent::new(Arc::new(GenaiModel::new(config.model.clone())))
        .with_tools(Arc::new(ToolRegistry::standard(guard, config.shell_timeout_secs)))
        .with_memory(Arc::new(DailyMemory::new(&root)));

    tracing::info!(workspace = %root.display(), "Sub-agent starting");
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        outcome = agent.run(&workspace) => {
            match outcome? {
                Some(path) => tracing::info!(result = %path.display(), "Sub-agent finished"),
                None => tracing::info!("Sub-agent finished without a result"),
            }
            Ok(())
        }
        _ = terminate.recv() => {
            anyhow::bail!("Sub-agent terminated before finishing its mission")
        }
    }
}
