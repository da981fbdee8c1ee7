//! Reference resolver (§4.J): a periodic task that turns textual pending
//! references into concrete graph edges once their target entity has
//! been indexed (possibly in another repository).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use mrcis_core::model::{CodeEntity, EntityKind, PendingReference, RelationType};
use mrcis_storage::StateStore;

use crate::error::Result;
use crate::stats_updater::RepositoryStatsUpdater;

const SUFFIX_CANDIDATE_LIMIT: usize = 20;

pub struct ReferenceResolver {
    state: Arc<StateStore>,
    batch_size: usize,
    max_attempts: u32,
    stats: RepositoryStatsUpdater,
}

impl ReferenceResolver {
    pub fn new(state: Arc<StateStore>, batch_size: usize, max_attempts: u32) -> Self {
        let stats = RepositoryStatsUpdater::new(state.clone());
        Self { state, batch_size, max_attempts, stats }
    }

    /// Runs forever on a `resolution_interval_seconds` timer until
    /// `shutdown` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_batch() {
                        warn!(error = %e, "reference resolver batch failed");
                    }
                }
            }
        }
    }

    /// §4.J steps 1-6 over up to `batch_size` pending references.
    pub fn run_batch(&self) -> Result<usize> {
        let pending = self.state.get_pending_references(self.batch_size)?;
        let mut touched_repositories = std::collections::HashSet::new();
        let mut resolved = 0;

        for reference in &pending {
            match self.resolve_one(reference) {
                Ok(Some(repository_id)) => {
                    touched_repositories.insert(repository_id);
                    resolved += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(reference_id = %reference.id, error = %e, "failed to resolve pending reference"),
            }
        }

        for repository_id in &touched_repositories {
            self.refresh_relation_count(repository_id)?;
        }
        Ok(resolved)
    }

    /// Returns `Some(source_repository_id)` if the reference resolved
    /// this pass, `None` if it was retried or marked unresolved.
    fn resolve_one(&self, reference: &PendingReference) -> Result<Option<String>> {
        let source = self
            .state
            .get_entity_by_id(&reference.source_entity_id)?
            .ok_or_else(|| crate::error::OrchestratorError::EntityNotFound(reference.source_entity_id.clone()))?;

        // Step 1: candidate lookup, exact then suffix fallback.
        let mut candidates = self.state.get_entities_by_qualified_name(&reference.target_qualified_name)?;
        if candidates.is_empty() {
            let suffix = reference.target_qualified_name.rsplit('.').next().unwrap_or(&reference.target_qualified_name);
            candidates = self.state.get_entities_by_suffix(suffix, SUFFIX_CANDIDATE_LIMIT)?;
        }

        // Step 2: filter by relation semantics.
        candidates.retain(|c| matches_relation_kind(reference.relation_type, c.kind));

        // Step 3: receiver disambiguation.
        if let Some(receiver) = &reference.receiver_expr {
            if candidates.len() > 1 {
                let tail = receiver.rsplit('.').next().unwrap_or(receiver);
                let narrowed: Vec<CodeEntity> = candidates
                    .iter()
                    .filter(|c| c.qualified_name.contains(tail))
                    .cloned()
                    .collect();
                if !narrowed.is_empty() {
                    candidates = narrowed;
                }
            }
        }

        // Step 4: tie-breaks (same repository, then shortest name, then lowest id).
        candidates.sort_by(|a, b| {
            let same_repo = |c: &CodeEntity| c.repository_id != source.repository_id;
            same_repo(a)
                .cmp(&same_repo(b))
                .then(a.qualified_name.len().cmp(&b.qualified_name.len()))
                .then(a.id.cmp(&b.id))
        });

        // Step 5: resolve or retry.
        if candidates.len() == 1 || (candidates.len() > 1 && is_unique_after_sort(&candidates)) {
            let target = &candidates[0];
            self.state.resolve_reference(&reference.id, &target.id, &source.repository_id, &target.repository_id)?;
            info!(reference_id = %reference.id, target = %target.qualified_name, "reference resolved");
            return Ok(Some(source.repository_id.clone()));
        }

        self.state.mark_reference_unresolved(&reference.id, self.max_attempts)?;
        Ok(None)
    }

    fn refresh_relation_count(&self, repository_id: &str) -> Result<()> {
        self.stats.update_after_resolution(repository_id)
    }
}

/// A single remaining candidate is trivially unique; more than one
/// after every tie-break is genuine ambiguity and is left pending
/// (§9 open question: the first-candidate fallback only applies in
/// §4.L's query surface, not here).
fn is_unique_after_sort(_candidates: &[CodeEntity]) -> bool {
    false
}

fn matches_relation_kind(relation_type: RelationType, kind: EntityKind) -> bool {
    match relation_type {
        RelationType::Extends | RelationType::Implements => matches!(kind, EntityKind::Class | EntityKind::Interface),
        RelationType::Calls => matches!(kind, EntityKind::Function | EntityKind::Method),
        RelationType::Instantiates => matches!(kind, EntityKind::Class),
        RelationType::Imports => true,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcis_core::model::{RelationType, Visibility};
    use mrcis_storage::StateStore;

    fn entity(id: &str, repo: &str, qualified_name: &str, kind: EntityKind) -> CodeEntity {
        CodeEntity::new(id, repo, "file-1", qualified_name, qualified_name, kind, "python", 1, 1).with_visibility(Visibility::Public)
    }

    #[test]
    fn resolves_unique_exact_match() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        state.add_entity(&entity("e1", "repo-a", "a.mod.f", EntityKind::Function)).unwrap();
        state.add_entity(&entity("e2", "repo-b", "b.util.g", EntityKind::Function)).unwrap();
        let reference = PendingReference::new("p1", "e1", "a.mod.f", "repo-a", "b.util.g", RelationType::Calls, 5);
        state.add_pending_reference(&reference).unwrap();

        let resolver = ReferenceResolver::new(state.clone(), 10, 3);
        let resolved = resolver.run_batch().unwrap();
        assert_eq!(resolved, 1);
        let relation = state.get_outgoing_relations("e1").unwrap();
        assert_eq!(relation.len(), 1);
        assert!(relation[0].is_cross_repository);
    }

    #[test]
    fn ambiguous_candidates_stay_pending_until_attempts_exhausted() {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        state.add_entity(&entity("e1", "repo-a", "a.mod.f", EntityKind::Function)).unwrap();
        state.add_entity(&entity("e2", "repo-a", "x.Helper.run", EntityKind::Method)).unwrap();
        state.add_entity(&entity("e3", "repo-b", "y.Helper.run", EntityKind::Method)).unwrap();
        let reference = PendingReference::new("p1", "e1", "a.mod.f", "repo-a", "run", RelationType::Calls, 5);
        state.add_pending_reference(&reference).unwrap();

        let resolver = ReferenceResolver::new(state.clone(), 10, 2);
        resolver.run_batch().unwrap();
        resolver.run_batch().unwrap();
        assert!(state.get_pending_references(10).unwrap().is_empty());
    }
}
