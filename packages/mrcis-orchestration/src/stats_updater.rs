//! Repository stats updater (§4.H step 10, §4.J step 6): recomputes a
//! repository's file/entity/relation counts and status, shared by the
//! indexing pipeline and the reference resolver so neither duplicates
//! the count-and-update logic.

use std::sync::Arc;

use chrono::Utc;

use mrcis_core::model::{RepositoryCounts, RepositoryStatus};
use mrcis_storage::StateStore;

use crate::error::Result;

pub struct RepositoryStatsUpdater {
    state: Arc<StateStore>,
}

impl RepositoryStatsUpdater {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }

    /// Called after a file finishes indexing (successfully or not):
    /// recomputes all three counts and derives `watching`/`indexing`
    /// from whether any file is still queued.
    pub fn update_after_file_indexed(&self, repository_id: &str) -> Result<()> {
        let counts = RepositoryCounts {
            files: self.state.list_files_by_repository(repository_id)?.len() as u64,
            entities: self.state.count_entities(repository_id)?,
            relations: self.state.count_relations(repository_id)?,
        };
        let pending = self.state.count_pending_files(repository_id)?;
        let status = if pending == 0 { RepositoryStatus::Watching } else { RepositoryStatus::Indexing };
        self.state.update_repository_stats(repository_id, counts, Utc::now(), None, status)?;
        Ok(())
    }

    /// Called after a reference-resolution batch touches a repository:
    /// only the relation count can have changed, so the other fields
    /// are carried over from the stored record untouched.
    pub fn update_after_resolution(&self, repository_id: &str) -> Result<()> {
        let Some(repo) = self.state.get_repository(repository_id)? else {
            return Ok(());
        };
        let counts = RepositoryCounts { relations: self.state.count_relations(repository_id)?, ..repo.counts };
        self.state.update_repository_stats(
            repository_id,
            counts,
            repo.last_indexed_at.unwrap_or_else(Utc::now),
            repo.last_indexed_commit.as_deref(),
            repo.status,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcis_core::model::{CodeEntity, EntityKind, IndexedFile, Visibility};

    #[test]
    fn update_after_file_indexed_marks_watching_when_queue_empty() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        let repo_id = state.create_repository("repo-a", RepositoryStatus::Indexing).unwrap();
        state
            .upsert_file(&IndexedFile::new("f1", &repo_id, "mod.py", "abc", 10, Utc::now()))
            .unwrap();
        state
            .add_entity(&CodeEntity::new("e1", &repo_id, "f1", "mod.f", "f", EntityKind::Function, "python", 1, 2).with_visibility(Visibility::Public))
            .unwrap();

        let updater = RepositoryStatsUpdater::new(state.clone());
        updater.update_after_file_indexed(&repo_id).unwrap();

        let repo = state.get_repository(&repo_id).unwrap().unwrap();
        assert_eq!(repo.status, RepositoryStatus::Watching);
        assert_eq!(repo.counts.files, 1);
        assert_eq!(repo.counts.entities, 1);
    }

    #[test]
    fn update_after_resolution_only_touches_relation_count() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        let repo_id = state.create_repository("repo-a", RepositoryStatus::Watching).unwrap();

        let updater = RepositoryStatsUpdater::new(state.clone());
        updater.update_after_resolution(&repo_id).unwrap();

        let repo = state.get_repository(&repo_id).unwrap().unwrap();
        assert_eq!(repo.status, RepositoryStatus::Watching);
        assert_eq!(repo.counts.relations, 0);
    }
}
