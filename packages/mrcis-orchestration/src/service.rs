//! Top-level wiring (§9 "Global process state"): the only process-wide
//! state is the lock handle and the set of background tasks it gates.
//! Everything else is owned by `MrcisService` and handed out by `Arc`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use mrcis_core::config::Config;
use mrcis_core::embedding::EmbeddingClient;
use mrcis_core::extract::ExtractorRegistry;
use mrcis_storage::{lock_path, InstanceLock, StateStore, VectorStore};

use crate::error::Result;
use crate::pipeline::{IndexingPipeline, RepoRoots};
use crate::query::QueryService;
use crate::reconciler::ConfigReconciler;
use crate::resolver::ReferenceResolver;
use crate::watcher::FileWatcher;

/// Lock is rewritten well inside its staleness window (default 90s); a
/// fixed 30s cadence matches `InstanceLock`'s own default.
const LOCK_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct MrcisService {
    pub state: Arc<StateStore>,
    pub vectors: Arc<VectorStore>,
    pub query: Arc<QueryService>,
    repo_roots: RepoRoots,
    pipeline: Arc<IndexingPipeline>,
    resolver: Arc<ReferenceResolver>,
    lock: Arc<tokio::sync::Mutex<InstanceLock>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl MrcisService {
    pub fn open(config: &Config, embedder: Arc<dyn EmbeddingClient>) -> Result<Self> {
        let data_dir = PathBuf::from(&config.storage.data_directory);
        std::fs::create_dir_all(&data_dir)?;

        let state_path = data_dir.join(&config.storage.state_db_name);
        let state = Arc::new(StateStore::open(state_path.to_string_lossy().as_ref())?);

        let vector_path = data_dir.join(format!("{}.db", config.storage.vector_table_name));
        let vectors = Arc::new(VectorStore::open(vector_path.to_string_lossy().as_ref(), embedder.dimensions())?);

        let lock = InstanceLock::acquire(lock_path(&data_dir), None)?;
        let holding = lock.is_held();

        let extractors = Arc::new(ExtractorRegistry::with_defaults());
        let repo_roots: RepoRoots = Arc::new(DashMap::new());

        if holding {
            let reconciler = ConfigReconciler::new(state.clone());
            let report = reconciler.reconcile(&config.repositories, &repo_roots)?;
            info!(added = report.added.len(), removed = report.removed.len(), unchanged = report.unchanged.len(), "configuration reconciled");
        } else {
            // Readers still need roots to resolve paths for queries.
            for repo_config in &config.repositories {
                if let Some(repo) = state.get_repository_by_name(&repo_config.name)? {
                    repo_roots.insert(repo.id, repo_config.path.clone().into());
                }
            }
        }

        let pipeline = Arc::new(IndexingPipeline::new(
            state.clone(),
            vectors.clone(),
            extractors,
            embedder.clone(),
            repo_roots.clone(),
            config.indexing.clone(),
        ));
        let resolver = Arc::new(ReferenceResolver::new(state.clone(), config.indexing.batch_size, config.indexing.max_retries));
        let query = Arc::new(QueryService::new(state.clone(), vectors.clone(), embedder));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            state,
            vectors,
            query,
            repo_roots,
            pipeline,
            resolver,
            lock: Arc::new(tokio::sync::Mutex::new(lock)),
            shutdown_tx,
            shutdown_rx,
            tasks: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub async fn is_writer(&self) -> bool {
        self.lock.lock().await.is_held()
    }

    /// Spawns the lock maintainer and, if this instance holds the write
    /// lock, the pipeline workers, one watcher per repository and the
    /// reference resolver. Readers only get the lock maintainer, which
    /// keeps retrying promotion in case the writer disappears.
    pub async fn start(&self, worker_count: usize, resolution_interval: Duration, watch_debounce_ms: u64) {
        let mut tasks = Vec::new();

        tasks.push(self.spawn_lock_maintainer());

        if self.is_writer().await {
            tasks.push(tokio::spawn({
                let pipeline = self.pipeline.clone();
                let shutdown = self.shutdown_rx.clone();
                async move {
                    pipeline.run_workers(worker_count, shutdown).await;
                }
            }));

            tasks.push(tokio::spawn({
                let resolver = self.resolver.clone();
                let shutdown = self.shutdown_rx.clone();
                async move {
                    resolver.run(resolution_interval, shutdown).await;
                }
            }));

            for entry in self.repo_roots.iter() {
                let repository_id = entry.key().clone();
                let watcher = FileWatcher::new(self.pipeline.clone(), self.repo_roots.clone(), watch_debounce_ms);
                let shutdown = self.shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = watcher.run(&repository_id, shutdown).await {
                        warn!(repository_id, error = %e, "file watcher exited with an error");
                    }
                }));
            }
        } else {
            info!("running as a read-only instance; write-side tasks are not started");
        }

        *self.tasks.lock().unwrap() = tasks;
    }

    /// Signals shutdown and waits up to `timeout` for background tasks
    /// to finish before abandoning them (§5 `shutdown_timeout_seconds`).
    pub async fn stop(&self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
        let joined = tokio::time::timeout(timeout, futures::future::join_all(tasks)).await;
        if joined.is_err() {
            warn!("shutdown timed out; abandoning remaining background tasks");
        }
        let mut lock = self.lock.lock().await;
        if let Err(e) = lock.release() {
            warn!(error = %e, "failed to release instance lock on shutdown");
        }
    }

    fn spawn_lock_maintainer(&self) -> JoinHandle<()> {
        let lock = self.lock.clone();
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LOCK_HEARTBEAT_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let mut guard = lock.lock().await;
                        let result = if guard.is_held() {
                            guard.heartbeat()
                        } else {
                            guard.check_and_promote().map(|_| ())
                        };
                        if let Err(e) = result {
                            warn!(error = %e, "instance lock maintenance failed");
                        }
                    }
                }
            }
        })
    }
}
