//! On-disk workspace: the markdown files that parameterize one agent.
//!
//! ```text
//! <root>/
//!   SOUL.md        persona (required)
//!   MISSION.md     task text for autonomous mode
//!   HEARTBEAT.md   optional periodic checklist
//!   skills/*.md    optional skill notes, appended to the system prompt
//!   memory/        daily memory logs
//!   RESULT.md      written by a sub-agent when it finishes
//! ```

pub mod watcher;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::CONFIG_FILE_NAME;
use crate::error::WorkspaceError;
use crate::storage::atomic_write_async;

pub const PERSONA_FILE: &str = "SOUL.md";
pub const MISSION_FILE: &str = "MISSION.md";
pub const CHECKLIST_FILE: &str = "HEARTBEAT.md";
pub const SKILLS_DIR: &str = "skills";
pub const MEMORY_DIR: &str = "memory";

/// A named skill note loaded from `skills/<name>.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    pub name: String,
    pub content: String,
}

/// In-memory snapshot of a workspace. Replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub persona: String,
    pub mission: Option<String>,
    pub checklist: Option<String>,
    pub skills: Vec<Skill>,
}

impl Workspace {
    /// Mission text, required in autonomous mode.
    pub fn require_mission(&self) -> Result<&str, WorkspaceError> {
        self.mission
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| WorkspaceError::MissionNotFound {
                path: self.root.join(MISSION_FILE),
            })
    }
}

#[async_trait]
pub trait WorkspaceLoader: Send + Sync {
    async fn load(&self, root: &Path) -> Result<Workspace, WorkspaceError>;
}

/// Loads workspaces straight from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWorkspaceLoader;

#[async_trait]
impl WorkspaceLoader for FsWorkspaceLoader {
    async fn load(&self, root: &Path) -> Result<Workspace, WorkspaceError> {
        let persona_path = root.join(PERSONA_FILE);
        let persona = read_optional(&persona_path)
            .await?
            .ok_or(WorkspaceError::PersonaNotFound { path: persona_path })?;

        Ok(Workspace {
            root: root.to_path_buf(),
            persona,
            mission: read_optional(&root.join(MISSION_FILE)).await?,
            checklist: read_optional(&root.join(CHECKLIST_FILE)).await?,
            skills: load_skills(&root.join(SKILLS_DIR)).await?,
        })
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, WorkspaceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Skills sorted by name so prompt assembly is deterministic.
async fn load_skills(dir: &Path) -> Result<Vec<Skill>, WorkspaceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut skills = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let content = tokio::fs::read_to_string(&path).await?;
        skills.push(Skill { name, content });
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(skills)
}

/// Create the isolated workspace for a sub-agent under `parent`.
///
/// The new workspace gets the mission, the parent's persona, its checklist,
/// skills and `familiar.toml` if any, and an empty memory directory. Files
/// are written with the atomic writer.
pub async fn provision_subagent_workspace(
    parent: &Path,
    task_id: &str,
    mission: &str,
    source: &Workspace,
) -> Result<PathBuf, WorkspaceError> {
    let root = parent.join(task_id);
    tokio::fs::create_dir_all(root.join(MEMORY_DIR)).await?;

    write_file(root.join(MISSION_FILE), mission).await?;
    write_file(root.join(PERSONA_FILE), &source.persona).await?;
    if let Some(checklist) = &source.checklist {
        write_file(root.join(CHECKLIST_FILE), checklist).await?;
    }
    if let Some(config) = read_optional(&source.root.join(CONFIG_FILE_NAME)).await? {
        write_file(root.join(CONFIG_FILE_NAME), &config).await?;
    }
    if !source.skills.is_empty() {
        let skills_dir = root.join(SKILLS_DIR);
        tokio::fs::create_dir_all(&skills_dir).await?;
        for skill in &source.skills {
            write_file(skills_dir.join(format!("{}.md", skill.name)), &skill.content).await?;
        }
    }

    tracing::debug!(task_id, root = %root.display(), "Provisioned sub-agent workspace");
    Ok(root)
}

async fn write_file(path: PathBuf, contents: &str) -> Result<(), WorkspaceError> {
    atomic_write_async(path, contents.as_bytes().to_vec(), 0o644).await?;
    Ok(())
}
