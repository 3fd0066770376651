//! Filesystem confinement: the path guard used before any path is treated as
//! "inside the workspace" or "inside the sub-agent root".

pub mod workspace;

pub use workspace::{clean, validate_path, WorkspaceGuard};
