//! Crash-safe file replacement.
//!
//! Content is staged in a uniquely named temp file in the destination's own
//! directory (same filesystem, so the final rename is atomic), flushed to
//! disk, given its permissions, and renamed over the destination. If any step
//! fails the temp file is removed when the [`NamedTempFile`] drops and the
//! destination keeps its previous bytes.

use std::fs::Permissions;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Atomically replace `path` with `contents`, leaving it with mode `mode`.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let staged = stage(path, contents, mode)?;
    commit(staged, path)
}

/// Async wrapper around [`atomic_write`] for use inside the runtime.
pub async fn atomic_write_async(path: PathBuf, contents: Vec<u8>, mode: u32) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || atomic_write(&path, &contents, mode))
        .await
        .map_err(std::io::Error::other)?
}

/// Write `contents` into a fresh temp file next to `path`.
fn stage(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged
        .as_file()
        .set_permissions(Permissions::from_mode(mode))?;
    Ok(staged)
}

/// Rename the staged file over `path`. On failure the temp file is dropped,
/// which deletes it.
fn commit(staged: NamedTempFile, path: &Path) -> std::io::Result<()> {
    staged.persist(path).map(|_| ()).map_err(|e| e.error)
}
