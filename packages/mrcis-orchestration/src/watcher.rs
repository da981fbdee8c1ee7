//! File watcher + event router (§4.I). One OS-level watcher thread per
//! configured repository posts raw events to a shared channel; a single
//! router task on the scheduler debounces by path and dispatches into
//! the indexing entry point. Only the lock holder runs this (§4.I
//! "reader instances do not watch").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info, warn};

use mrcis_core::model::FileStatus;
use mrcis_core::scan::Scanner;

use crate::error::Result;
use crate::pipeline::{IndexingPipeline, RepoRoots};

/// A raw, not-yet-debounced filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
struct RawEvent {
    kind: RawKind,
    path: PathBuf,
    repository_id: String,
}

/// Spawns one native watcher per repository root and a router task that
/// debounces and dispatches. Returns a handle whose drop stops the
/// watcher threads.
pub struct FileWatcher {
    pipeline: Arc<IndexingPipeline>,
    repo_roots: RepoRoots,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(pipeline: Arc<IndexingPipeline>, repo_roots: RepoRoots, debounce_ms: u64) -> Self {
        Self { pipeline, repo_roots, debounce: Duration::from_millis(debounce_ms) }
    }

    /// Runs until `shutdown` fires. The watcher's own join timeout is 5s
    /// (§5); stragglers are abandoned rather than awaited indefinitely.
    pub async fn run(&self, repository_id: &str, mut shutdown: tokio::sync::watch::Receiver<bool>) -> Result<()> {
        let repo_root = self
            .repo_roots
            .get(repository_id)
            .map(|r| r.clone())
            .ok_or_else(|| crate::error::OrchestratorError::watcher(format!("unknown repository {repository_id}")))?;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<RawEvent>();
        let repo_id_owned = repository_id.to_string();
        let root_for_thread = repo_root.clone();

        let (watcher_thread, watcher_handle) = spawn_native_watcher(root_for_thread, repo_id_owned, tx)?;

        let mut pending: HashMap<PathBuf, (RawKind, Instant)> = HashMap::new();
        let mut tick = tokio::time::interval(self.debounce / 2 + Duration::from_millis(1));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            pending.insert(event.path, (event.kind, Instant::now()));
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.flush_debounced(&mut pending, &repo_root, repository_id);
                }
            }
        }

        drop(watcher_handle);
        if watcher_thread.join_timeout(Duration::from_secs(5)).is_err() {
            warn!(repository_id, "watcher thread did not join within 5s, abandoning");
        }
        Ok(())
    }

    fn flush_debounced(&self, pending: &mut HashMap<PathBuf, (RawKind, Instant)>, repo_root: &Path, repository_id: &str) {
        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, (_, at))| now.duration_since(*at) >= self.debounce)
            .map(|(path, _)| path.clone())
            .collect();

        for path in ready {
            let (kind, _) = pending.remove(&path).unwrap();
            self.route(&path, kind, repo_root, repository_id);
        }
    }

    /// Router logic (§4.I): created/modified enqueue through the
    /// indexing entry point; deleted re-stats first since an atomic
    /// save looks like delete-then-create.
    fn route(&self, path: &Path, kind: RawKind, repo_root: &Path, repository_id: &str) {
        match kind {
            RawKind::Created | RawKind::Modified => {
                if let Err(e) = self.pipeline.index_file(path, repository_id, repo_root) {
                    error!(path = %path.display(), error = %e, "failed to enqueue changed file");
                }
            }
            RawKind::Deleted => {
                if path.exists() {
                    if let Err(e) = self.pipeline.index_file(path, repository_id, repo_root) {
                        error!(path = %path.display(), error = %e, "failed to re-index atomically-replaced file");
                    }
                    return;
                }
                self.handle_removed(path, repo_root, repository_id);
            }
        }
    }

    fn handle_removed(&self, path: &Path, repo_root: &Path, repository_id: &str) {
        let relative = path.strip_prefix(repo_root).unwrap_or(path).to_string_lossy().replace('\\', "/");
        match self.pipeline.state_store().get_file_by_path(repository_id, &relative) {
            Ok(Some(file)) => {
                if let Err(e) = self.pipeline.vector_store().delete_by_file(&file.id) {
                    error!(path = %path.display(), error = %e, "failed to delete vectors for removed file");
                }
                if let Err(e) = self.pipeline.state_store().delete_entities_for_file(&file.id) {
                    error!(path = %path.display(), error = %e, "failed to delete entities for removed file");
                }
                if let Err(e) = self.pipeline.state_store().update_file_status(&file.id, FileStatus::Deleted) {
                    error!(path = %path.display(), error = %e, "failed to mark file deleted");
                }
                info!(path = %path.display(), "file removed and marked deleted");
            }
            Ok(None) => {}
            Err(e) => error!(path = %path.display(), error = %e, "failed to look up removed file"),
        }
    }
}

/// Wraps the blocking native watcher so it can be dropped to stop
/// delivering events and joined with a bounded timeout.
struct NativeWatcherThread(std::thread::JoinHandle<()>);

impl NativeWatcherThread {
    fn join_timeout(self, timeout: Duration) -> std::result::Result<(), ()> {
        let start = Instant::now();
        while !self.0.is_finished() {
            if start.elapsed() > timeout {
                return Err(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let _ = self.0.join();
        Ok(())
    }
}

fn spawn_native_watcher(
    root: PathBuf,
    repository_id: String,
    tx: tokio::sync::mpsc::UnboundedSender<RawEvent>,
) -> Result<(NativeWatcherThread, RecommendedWatcher)> {
    let scanner_root = root.clone();
    let (inner_tx, inner_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = inner_tx.send(res);
    })
    .map_err(|e| crate::error::OrchestratorError::watcher(format!("failed to start watcher: {e}")))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| crate::error::OrchestratorError::watcher(format!("failed to watch {}: {e}", root.display())))?;

    let files_config = mrcis_core::config::FilesConfig::default();
    let thread = std::thread::spawn(move || {
        let scanner = match Scanner::new(&scanner_root, &files_config) {
            Ok(s) => s,
            Err(e) => {
                error!(repository_id, error = %e, "failed to build scanner for watcher thread");
                return;
            }
        };
        for res in inner_rx {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(repository_id, error = %e, "watcher backend reported an error");
                    continue;
                }
            };
            for raw in classify(&event, &scanner) {
                let raw = RawEvent { repository_id: repository_id.clone(), ..raw };
                if tx.send(raw).is_err() {
                    return;
                }
            }
        }
    });

    Ok((NativeWatcherThread(thread), watcher))
}

/// Ignores directory events and anything the inclusion policy rejects
/// or that looks like a transient state-store file.
fn classify(event: &notify::Event, scanner: &Scanner) -> Vec<RawEvent> {
    let mut out = Vec::new();
    for path in &event.paths {
        if path.is_dir() {
            continue;
        }
        if is_transient_store_file(path) {
            continue;
        }
        let accepted = scanner.accepts(path);
        let kind = match event.kind {
            EventKind::Create(_) => {
                if accepted {
                    Some(RawKind::Created)
                } else {
                    None
                }
            }
            EventKind::Modify(_) => {
                if accepted {
                    Some(RawKind::Modified)
                } else {
                    None
                }
            }
            EventKind::Remove(_) => Some(RawKind::Deleted),
            _ => None,
        };
        if let Some(kind) = kind {
            out.push(RawEvent { kind, path: path.clone(), repository_id: String::new() });
        }
    }
    out
}

fn is_transient_store_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.ends_with("-journal") || name.ends_with("-wal") || name.ends_with("-shm"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_store_files_are_recognized() {
        assert!(is_transient_store_file(Path::new("state.db-wal")));
        assert!(is_transient_store_file(Path::new("state.db-journal")));
        assert!(is_transient_store_file(Path::new("state.db-shm")));
        assert!(!is_transient_store_file(Path::new("state.db")));
    }
}
