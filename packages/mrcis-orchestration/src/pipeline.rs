//! Indexing pipeline (§4.H). Two entry points:
//!
//! - [`IndexingPipeline::index_file`] is the *lightweight* entry the file
//!   watcher's router and the initial repository scan call: it diffs a
//!   path's checksum/mtime against stored state, upserts the
//!   [`IndexedFile`] row and enqueues it. It never parses the file.
//! - [`IndexingPipeline::run_workers`] spawns the worker pool (§5
//!   "Pipeline workers") that dequeues and runs the full extract →
//!   embed → persist sequence per file.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use mrcis_core::config::IndexingConfig;
use mrcis_core::embedding::EmbeddingClient;
use mrcis_core::extract::{ExtractionContext, ExtractionResult, ExtractorRegistry};
use mrcis_core::model::{FileStatus, IndexedFile, Visibility};
use mrcis_storage::{StateStore, VectorRow, VectorStore};

use crate::error::{OrchestratorError, Result};
use crate::failure_policy::FailurePolicy;
use crate::stats_updater::RepositoryStatsUpdater;

/// Shared map from `repository_id` to its filesystem root, populated by
/// the config reconciler at startup and kept by whoever adds a
/// repository at runtime. Every component that needs to turn a stored,
/// repository-relative path back into an absolute one reads from here.
pub type RepoRoots = Arc<DashMap<String, PathBuf>>;

pub struct IndexingPipeline {
    state: Arc<StateStore>,
    vectors: Arc<VectorStore>,
    extractors: Arc<ExtractorRegistry>,
    embedder: Arc<dyn EmbeddingClient>,
    repo_roots: RepoRoots,
    config: IndexingConfig,
    failure_policy: FailurePolicy,
    stats: RepositoryStatsUpdater,
}

impl IndexingPipeline {
    pub fn new(
        state: Arc<StateStore>,
        vectors: Arc<VectorStore>,
        extractors: Arc<ExtractorRegistry>,
        embedder: Arc<dyn EmbeddingClient>,
        repo_roots: RepoRoots,
        config: IndexingConfig,
    ) -> Self {
        let failure_policy = FailurePolicy::new(config.max_retries);
        let stats = RepositoryStatsUpdater::new(state.clone());
        Self { state, vectors, extractors, embedder, repo_roots, config, failure_policy, stats }
    }

    pub fn state_store(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    /// The router/scan entry point. Computes checksum + size + mtime,
    /// compares against the stored record for `(repository_id, relative
    /// path)`, and upserts + enqueues only if something changed. Returns
    /// the file id either way.
    pub fn index_file(&self, path: &Path, repository_id: &str, repo_root: &Path) -> Result<String> {
        let relative = path
            .strip_prefix(repo_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let metadata = std::fs::metadata(path)?;
        let bytes = std::fs::read(path)?;
        let checksum = checksum_of(&bytes);
        let last_modified_at = metadata
            .modified()
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        if let Some(existing) = self.state.get_file_by_path(repository_id, &relative)? {
            if existing.checksum == checksum {
                return Ok(existing.id);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut file = IndexedFile::new(&id, repository_id, &relative, &checksum, bytes.len() as u64, last_modified_at);
        file.status = FileStatus::Pending;
        let file_id = self.state.upsert_file(&file)?;
        self.state.enqueue(&file_id, repository_id, 0)?;
        Ok(file_id)
    }

    /// Spawns `worker_count` tasks (§5 "Pipeline workers"), each looping
    /// dequeue → index until `shutdown` fires. Workers idle-poll the
    /// queue rather than blocking, since the store has no notification
    /// channel of its own.
    pub async fn run_workers(self: Arc<Self>, worker_count: usize, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut handles = Vec::new();
        for worker_id in 0..worker_count.max(1) {
            let pipeline = Arc::clone(&self);
            let mut shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if *shutdown.borrow() {
                        break;
                    }
                    match pipeline.state.dequeue_next() {
                        Ok(Some(entry)) => {
                            if let Err(e) = pipeline.process_queued_file(&entry.file_id, &entry.repository_id).await {
                                error!(worker_id, file_id = %entry.file_id, error = %e, "indexing worker hit an unrecoverable error");
                            }
                        }
                        Ok(None) => {
                            tokio::select! {
                                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
                                _ = shutdown.changed() => {}
                            }
                        }
                        Err(e) => {
                            error!(worker_id, error = %e, "queue dequeue failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        let _ = shutdown.changed().await;
    }

    /// §4.H steps 1-10 for a single dequeued file. All failures are
    /// caught here and recorded on the file record; nothing propagates
    /// to the worker loop (§7 propagation policy).
    async fn process_queued_file(&self, file_id: &str, repository_id: &str) -> Result<()> {
        let file = match self.state.get_file(file_id)? {
            Some(f) => f,
            None => {
                warn!(file_id, "dequeued file no longer exists, skipping");
                return Ok(());
            }
        };

        if let Err(e) = self.index_one(&file).await {
            self.record_failure(&file, &e.to_string())?;
        }

        self.refresh_repository_stats(repository_id)?;
        Ok(())
    }

    async fn index_one(&self, file: &IndexedFile) -> Result<()> {
        let repo_root = self
            .repo_roots
            .get(&file.repository_id)
            .map(|r| r.clone())
            .ok_or_else(|| OrchestratorError::RepositoryNotFound(file.repository_id.clone()))?;
        let absolute = repo_root.join(&file.path);

        // Step 2: cleanup prior data, vectors first.
        self.vectors.delete_by_file(&file.id)?;
        self.state.delete_entities_for_file(&file.id)?;

        // Step 1: language detection + step 3: extractor lookup.
        let extractor = self.extractors.resolve(&absolute);
        if extractor.language_name() == "unknown" {
            self.state.update_file_indexed(&file.id, 0)?;
            return Ok(());
        }

        let source_bytes = std::fs::read(&absolute)?;
        let ctx = ExtractionContext::new(file.path.clone(), file.id.clone(), file.repository_id.clone(), source_bytes)
            .with_language(extractor.language_name());

        // Step 4: extraction; an extractor panic is the "unrecoverable
        // exception" this step re-raises into pipeline failure handling.
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(&ctx)))
            .map_err(|_| OrchestratorError::Other(anyhow::anyhow!("extractor panicked for {}", file.path)))?;

        if !result.parse_errors.is_empty() {
            info!(file = %file.path, errors = result.parse_errors.len(), "extractor reported recoverable parse errors");
        }

        self.persist_extraction(file, &result).await?;
        self.state.update_file_indexed(&file.id, result.entities.len() as u64)?;
        Ok(())
    }

    async fn persist_extraction(&self, file: &IndexedFile, result: &ExtractionResult) -> Result<()> {
        if result.entities.is_empty() {
            return Ok(());
        }

        // Steps 5-6: embedding text + one batched embed call, paired by index.
        let texts: Vec<String> = result.entities.iter().map(|e| e.embedding_text()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;

        // Step 7: persist vectors.
        let rows: Vec<VectorRow> = result
            .entities
            .iter()
            .zip(vectors.into_iter())
            .map(|(entity, vector)| VectorRow {
                id: entity.id.clone(),
                repository_id: entity.repository_id.clone(),
                file_id: entity.file_id.clone(),
                qualified_name: entity.qualified_name.clone(),
                simple_name: entity.simple_name.clone(),
                kind: entity.kind.as_str().to_string(),
                language: entity.language.clone(),
                file_path: file.path.clone(),
                line_start: entity.line_start,
                line_end: entity.line_end,
                vector,
                embedding_text: entity.embedding_text(),
                visibility: visibility_str(entity.visibility).to_string(),
                is_exported: entity.is_exported,
                has_docstring: entity.docstring.is_some(),
                signature: entity.signature.clone(),
                docstring: entity.docstring.clone(),
            })
            .collect();
        self.vectors.upsert(&rows)?;

        // Step 8: persist entities, edges and pending references.
        for entity in &result.entities {
            self.state.add_entity(entity)?;
        }
        for relation in &result.relations {
            self.state.add_relation(relation, &file.repository_id)?;
        }
        for reference in &result.pending_references {
            self.state.add_pending_reference(reference)?;
        }
        Ok(())
    }

    /// Failure policy (§4.H step 9): bump `failure_count` and hand it to
    /// the shared [`FailurePolicy`] to decide retry vs. permanent failure.
    fn record_failure(&self, file: &IndexedFile, error_message: &str) -> Result<()> {
        let failure_count = file.failure_count + 1;
        let (_should_retry, status) = self.failure_policy.determine_action(failure_count);
        warn!(file = %file.path, failure_count, ?status, error_message, "file indexing failed");
        self.state.update_file_failure(&file.id, status, failure_count, error_message)?;
        Ok(())
    }

    /// Step 10: recompute repository-wide counts and derive status.
    fn refresh_repository_stats(&self, repository_id: &str) -> Result<()> {
        self.stats.update_after_file_indexed(repository_id)
    }
}

fn visibility_str(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
        Visibility::Protected => "protected",
        Visibility::PackagePrivate => "package_private",
        Visibility::Unspecified => "unspecified",
    }
}

fn checksum_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcis_core::config::EmbeddingConfig;
    use mrcis_core::embedding::OpenAiEmbeddingClient;
    use std::fs;
    use tempfile::tempdir;

    fn pipeline(repo_root: &Path, repository_id: &str) -> (Arc<IndexingPipeline>, Arc<StateStore>) {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        let vectors = Arc::new(VectorStore::open_in_memory(768).unwrap());
        let extractors = Arc::new(ExtractorRegistry::with_defaults());
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(OpenAiEmbeddingClient::new(EmbeddingConfig::default()).unwrap());
        let repo_roots: RepoRoots = Arc::new(DashMap::new());
        repo_roots.insert(repository_id.to_string(), repo_root.to_path_buf());
        let pipeline = Arc::new(IndexingPipeline::new(state.clone(), vectors, extractors, embedder, repo_roots, IndexingConfig::default()));
        (pipeline, state)
    }

    #[test]
    fn index_file_is_a_no_op_when_checksum_unchanged() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1").unwrap();
        let (pipeline, _state) = pipeline(dir.path(), "repo-1");

        let id1 = pipeline.index_file(&dir.path().join("a.py"), "repo-1", dir.path()).unwrap();
        let id2 = pipeline.index_file(&dir.path().join("a.py"), "repo-1", dir.path()).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn index_file_requeues_on_content_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, "x = 1").unwrap();
        let (pipeline, state) = pipeline(dir.path(), "repo-1");
        pipeline.index_file(&path, "repo-1", dir.path()).unwrap();
        assert_eq!(state.queue_length().unwrap(), 1);
        state.dequeue_next().unwrap();

        fs::write(&path, "x = 2").unwrap();
        pipeline.index_file(&path, "repo-1", dir.path()).unwrap();
        assert_eq!(state.queue_length().unwrap(), 1);
    }
}
