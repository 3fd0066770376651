pub mod merge;
pub mod schema;

pub use schema::*;

use crate::cli::{Cli, Commands};
use crate::error::ConfigError;
use anyhow::Context;
use std::path::{Path, PathBuf};

/// File name of the global and per-workspace config layers.
pub const CONFIG_FILE_NAME: &str = "familiar.toml";
const CREDENTIALS_FILE_NAME: &str = "credentials.toml";

/// Load configuration by merging global, workspace, explicit and CLI sources.
/// Precedence: CLI > --config file > workspace config > global config > defaults.
///
/// Missing global/workspace files are handled gracefully (defaults apply). An
/// explicit `--config` file must exist and parse.
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/familiar/familiar.toml or platform equivalent)
    let global = load_global_config();

    // Layer 3 is read early: it may name the workspace.
    let explicit = match cli.command.config_path() {
        Some(path) => load_explicit_config(path)?,
        None => PartialConfig::default(),
    };

    // Determine workspace path for loading the workspace config.
    let workspace_path = cli_workspace(cli)
        .or_else(|| explicit.workspace.clone())
        .or_else(|| global.workspace.clone())
        .unwrap_or_else(|| PathBuf::from("./workspace"));

    // Layer 2: Workspace config (workspace/familiar.toml)
    let workspace = load_workspace_config(&workspace_path);

    // Layer 4: CLI args (converted to PartialConfig)
    let cli_partial = cli_to_partial(cli);

    let config = cli_partial
        .with_fallback(explicit)
        .with_fallback(workspace)
        .with_fallback(global)
        .finalize();

    Ok(config)
}

/// Credentials file actually in effect: `--credentials`, else the global
/// default if it exists.
pub fn credentials_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = cli.command.credentials_path() {
        return Some(path.clone());
    }
    project_dirs()
        .map(|dirs| dirs.config_dir().join(CREDENTIALS_FILE_NAME))
        .filter(|path| path.exists())
}

/// Read the credentials file. No path means no credentials.
pub fn load_credentials(path: Option<&Path>) -> Result<Credentials, ConfigError> {
    let Some(path) = path else {
        return Ok(Credentials::default());
    };
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match project_dirs() {
        Some(dirs) => load_toml_file(&dirs.config_dir().join(CONFIG_FILE_NAME)).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load workspace config from workspace/familiar.toml.
/// Returns empty PartialConfig if file not found.
fn load_workspace_config(workspace_path: &Path) -> PartialConfig {
    load_toml_file(&workspace_path.join(CONFIG_FILE_NAME)).unwrap_or_default()
}

fn load_explicit_config(path: &Path) -> anyhow::Result<PartialConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let file = toml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(file.to_partial())
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; parse errors are logged and skipped.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Linux: ~/.config/familiar/
/// macOS: ~/Library/Application Support/familiar/
fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "familiar")
}

fn cli_workspace(cli: &Cli) -> Option<PathBuf> {
    match &cli.command {
        Commands::Run { workspace, .. } => workspace.clone(),
        Commands::Subagent { workspace, .. } => Some(workspace.clone()),
    }
}

fn cli_to_partial(cli: &Cli) -> PartialConfig {
    match &cli.command {
        Commands::Run {
            model, workspace, ..
        } => PartialConfig {
            model: model.clone(),
            workspace: workspace.clone(),
            ..Default::default()
        },
        Commands::Subagent {
            model, workspace, ..
        } => PartialConfig {
            model: model.clone(),
            workspace: Some(workspace.clone()),
            ..Default::default()
        },
    }
}
