//! Polling change detector for workspace files.
//!
//! Only top-level markdown files and `skills/*.md` are watched; `memory/` is
//! excluded because the agent writes there on every turn.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::SKILLS_DIR;

type Fingerprint = BTreeMap<PathBuf, (SystemTime, u64)>;

/// Poll `root` every `interval` and send a notification when a watched file
/// is added, removed or modified. Notifications coalesce: if one is already
/// pending, another is not queued. Returns when `cancel` fires or the
/// receiver is dropped.
pub async fn watch(
    root: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<()>,
) {
    let mut last = scan(&root).await.unwrap_or_default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(current) = scan(&root).await else {
            continue;
        };
        if current == last {
            continue;
        }
        last = current;
        tracing::debug!(root = %root.display(), "Workspace files changed");
        match tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => return,
        }
    }
}

/// Run [`fingerprint`] on the blocking pool. `None` if the scan task died.
async fn scan(root: &Path) -> Option<Fingerprint> {
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || fingerprint(&root)).await {
        Ok(fp) => Some(fp),
        Err(e) => {
            tracing::warn!(error = %e, "Workspace scan failed");
            None
        }
    }
}

fn fingerprint(root: &Path) -> Fingerprint {
    let mut out = Fingerprint::new();
    collect_markdown(root, &mut out);
    collect_markdown(&root.join(SKILLS_DIR), &mut out);
    out
}

fn collect_markdown(dir: &Path, out: &mut Fingerprint) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.is_file() {
                let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                out.insert(path, (modified, meta.len()));
            }
        }
    }
}
