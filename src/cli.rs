use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "familiar", version, about = "Personal autonomous agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the chat agent
    Run {
        /// Model name as understood by genai (e.g. "gpt-4o-mini", "claude-3-5-haiku-latest")
        #[arg(short, long)]
        model: Option<String>,

        /// Workspace directory path
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Path to config file (layered over the global and workspace files)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to the credentials file
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
    /// Work one mission unattended and write RESULT.md (launched by the runner)
    Subagent {
        /// Isolated sub-agent workspace
        #[arg(short, long)]
        workspace: PathBuf,

        /// Task identifier, used for log context
        #[arg(long)]
        task_id: String,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to the credentials file
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
}

impl Commands {
    pub fn config_path(&self) -> Option<&PathBuf> {
        match self {
            Commands::Run { config, .. } | Commands::Subagent { config, .. } => config.as_ref(),
        }
    }

    pub fn credentials_path(&self) -> Option<&PathBuf> {
        match self {
            Commands::Run { credentials, .. } | Commands::Subagent { credentials, .. } => {
                credentials.as_ref()
            }
        }
    }
}
