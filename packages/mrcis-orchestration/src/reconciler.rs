//! Config reconciler (§4.K): on writer startup, diff the declarative
//! repository list against the `repositories` table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use mrcis_core::config::RepositoryConfig;
use mrcis_core::model::RepositoryStatus;
use mrcis_storage::StateStore;

use crate::error::Result;
use crate::pipeline::RepoRoots;

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

pub struct ConfigReconciler {
    state: Arc<StateStore>,
}

impl ConfigReconciler {
    pub fn new(state: Arc<StateStore>) -> Self {
        Self { state }
    }

    /// Inserts repositories present in config but not the DB as
    /// `pending`; warns (without deleting) about DB rows absent from
    /// config; leaves rows present in both untouched. Also populates
    /// `repo_roots` for every repository name the caller still wants
    /// tracked, so the pipeline/watcher can resolve absolute paths.
    pub fn reconcile(&self, repositories: &[RepositoryConfig], repo_roots: &RepoRoots) -> Result<ReconcileReport> {
        let existing: HashMap<String, mrcis_core::model::Repository> =
            self.state.list_repositories()?.into_iter().map(|r| (r.name.clone(), r)).collect();
        let configured: HashMap<&str, &RepositoryConfig> = repositories.iter().map(|r| (r.name.as_str(), r)).collect();

        let mut report = ReconcileReport::default();

        for repo_config in repositories {
            if let Some(repo) = existing.get(&repo_config.name) {
                repo_roots.insert(repo.id.clone(), repo_config.path.clone().into());
                report.unchanged.push(repo_config.name.clone());
            } else {
                let id = self.state.create_repository(&repo_config.name, RepositoryStatus::Pending)?;
                repo_roots.insert(id, repo_config.path.clone().into());
                report.added.push(repo_config.name.clone());
            }
        }

        for (name, _repo) in &existing {
            if !configured.contains_key(name.as_str()) {
                warn!(repository = %name, "repository present in state store but absent from configuration; not deleting, manual action required");
                report.removed.push(name.clone());
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    fn repo_config(name: &str, path: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: name.to_string(),
            path: path.to_string(),
            branch: None,
            depends_on: Vec::new(),
            include_patterns: None,
            exclude_patterns: None,
        }
    }

    #[test]
    fn adds_configured_repositories_not_in_store() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        let reconciler = ConfigReconciler::new(state.clone());
        let roots: RepoRoots = Arc::new(DashMap::new());

        let report = reconciler.reconcile(&[repo_config("demo", "/tmp/demo")], &roots).unwrap();
        assert_eq!(report.added, vec!["demo".to_string()]);
        assert!(state.get_repository_by_name("demo").unwrap().is_some());
    }

    #[test]
    fn warns_but_keeps_repositories_absent_from_config() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        state.create_repository("orphan", RepositoryStatus::Watching).unwrap();
        let reconciler = ConfigReconciler::new(state.clone());
        let roots: RepoRoots = Arc::new(DashMap::new());

        let report = reconciler.reconcile(&[], &roots).unwrap();
        assert_eq!(report.removed, vec!["orphan".to_string()]);
        assert!(state.get_repository_by_name("orphan").unwrap().is_some());
    }

    #[test]
    fn leaves_repositories_present_in_both_untouched() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        state.create_repository("demo", RepositoryStatus::Watching).unwrap();
        let reconciler = ConfigReconciler::new(state.clone());
        let roots: RepoRoots = Arc::new(DashMap::new());

        let report = reconciler.reconcile(&[repo_config("demo", "/tmp/demo")], &roots).unwrap();
        assert_eq!(report.unchanged, vec!["demo".to_string()]);
        assert_eq!(state.get_repository_by_name("demo").unwrap().unwrap().status, RepositoryStatus::Watching);
    }
}
