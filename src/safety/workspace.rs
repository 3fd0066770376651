use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Upper bound on dangling-symlink hops followed while resolving a path.
const MAX_LINK_HOPS: usize = 40;

/// Check that `target` lives inside `root`, resolving `..` and symlinks first.
///
/// Both paths are made absolute, lexically cleaned and symlink-resolved. A
/// target that does not exist yet inherits the resolved location of its
/// deepest existing ancestor, so a file about to be created under a
/// symlinked directory is judged by where it would really land.
///
/// Returns the resolved target on success.
pub fn validate_path(root: &Path, target: &Path) -> Result<PathBuf, PathError> {
    let resolved_root = resolve(root)?;
    let resolved_target = resolve(target)?;

    if is_within(&resolved_root, &resolved_target) {
        Ok(resolved_target)
    } else {
        Err(PathError::OutOfBounds {
            path: target.to_path_buf(),
            root: resolved_root,
        })
    }
}

/// `target` equals `root` or sits below it. Comparison is per component, so
/// `/srv/data-old` is not inside `/srv/data`.
fn is_within(root: &Path, target: &Path) -> bool {
    target == root || target.starts_with(root)
}

/// Absolute, cleaned, symlink-resolved form of `path`, tolerating a missing tail.
pub fn resolve(path: &Path) -> Result<PathBuf, PathError> {
    let absolute = std::path::absolute(path).map_err(|source| PathError::Resolve {
        path: path.to_path_buf(),
        source,
    })?;
    resolve_with_hops(&clean(&absolute), 0)
}

fn resolve_with_hops(path: &Path, hops: usize) -> Result<PathBuf, PathError> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match std::fs::canonicalize(&existing) {
            Ok(mut resolved) => {
                for segment in missing.iter().rev() {
                    resolved.push(segment);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // A dangling symlink canonicalizes as NotFound but must still
                // be judged by where it points.
                if let Ok(target) = std::fs::read_link(&existing) {
                    if hops >= MAX_LINK_HOPS {
                        return Err(PathError::Resolve {
                            path: path.to_path_buf(),
                            source: std::io::Error::new(
                                ErrorKind::InvalidInput,
                                "too many levels of symbolic links",
                            ),
                        });
                    }
                    let base = existing.parent().unwrap_or(Path::new("/"));
                    let mut followed = clean(&base.join(target));
                    for segment in missing.iter().rev() {
                        followed.push(segment);
                    }
                    return resolve_with_hops(&clean(&followed), hops + 1);
                }

                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        missing.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => {
                        return Err(PathError::Resolve {
                            path: path.to_path_buf(),
                            source: e,
                        });
                    }
                }
            }
            Err(source) => {
                return Err(PathError::Resolve {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// Lexically remove `.` and `..` components. `..` never climbs above the root.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) => out.push(name),
        }
    }
    out
}

/// Confines file tool access to one workspace directory.
pub struct WorkspaceGuard {
    /// Canonical (absolute, symlinks resolved) workspace root.
    canonical_root: PathBuf,
}

impl WorkspaceGuard {
    /// Create a new guard for the given workspace path.
    /// Creates the directory if it doesn't exist and resolves to canonical path.
    pub fn new(workspace_path: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(workspace_path)?;
        let canonical_root = std::fs::canonicalize(workspace_path)?;
        Ok(Self { canonical_root })
    }

    /// Resolve a tool-supplied path (relative to the workspace, or absolute)
    /// and reject it unless it stays inside the workspace.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, PathError> {
        let candidate = Path::new(requested);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.canonical_root.join(candidate)
        };
        validate_path(&self.canonical_root, &joined)
    }

    /// Get the canonical workspace root path.
    pub fn canonical_root(&self) -> &Path {
        &self.canonical_root
    }
}
