//! Append-only daily memory log.
//!
//! Each entry is one markdown bullet in `memory/YYYY-MM-DD.md`:
//!
//! ```text
//! - 14:03:11 [owner] remind me to water the plants
//! - 14:03:15 [agent] Will do, I'll ping you at 18:00.
//! ```
//!
//! Memory is best-effort: callers log failures and carry on.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Local;
use tokio::io::AsyncWriteExt;

use crate::workspace::MEMORY_DIR;

/// Source tags used by the orchestration core.
pub const SOURCE_OWNER: &str = "owner";
pub const SOURCE_AGENT: &str = "agent";
pub const SOURCE_SUBAGENT: &str = "subagent";
pub const SOURCE_HEARTBEAT: &str = "heartbeat";

#[async_trait]
pub trait MemoryWriter: Send + Sync {
    async fn write(&self, source: &str, text: &str) -> anyhow::Result<()>;
}

/// Writes to `<workspace>/memory/<local date>.md`.
pub struct DailyMemory {
    dir: PathBuf,
}

impl DailyMemory {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            dir: workspace_root.into().join(MEMORY_DIR),
        }
    }

    fn format_entry(time: &str, source: &str, text: &str) -> String {
        // Continuation lines are indented so the bullet stays one entry.
        let body = text.trim().replace('\n', "\n  ");
        format!("- {time} [{source}] {body}\n")
    }
}

#[async_trait]
impl MemoryWriter for DailyMemory {
    async fn write(&self, source: &str, text: &str) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let now = Local::now();
        let path = self.dir.join(format!("{}.md", now.format("%Y-%m-%d")));
        let entry = Self::format_entry(&now.format("%H:%M:%S").to_string(), source, text);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(entry.as_bytes())
            .await
            .with_context(|| format!("appending to {}", path.display()))?;
        file.flush().await?;
        Ok(())
    }
}
