//! Query surface (§4.L): read-only lookups served by every instance,
//! reader or writer. Ambiguity here is resolved with a first-candidate
//! fallback, which is deliberately more permissive than the reference
//! resolver's conservative policy in [`crate::resolver`].

use std::sync::Arc;

use mrcis_core::embedding::EmbeddingClient;
use mrcis_core::model::CodeEntity;
use mrcis_storage::{StateStore, VectorFilters, VectorStore};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SymbolMatch {
    pub entity: CodeEntity,
    pub file_path: String,
    pub repository_name: String,
}

#[derive(Debug, Clone)]
pub struct EnrichedRelation {
    pub file_path: String,
    pub repository: String,
    pub line_number: Option<u32>,
    pub relation_type: String,
    pub context_snippet: Option<String>,
    pub other_qualified_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferencesResult {
    pub incoming: Vec<EnrichedRelation>,
    pub outgoing: Vec<EnrichedRelation>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub qualified_name: String,
    pub repository: String,
    pub language: String,
    pub file_path: String,
    pub snippet: String,
    pub score: f64,
}

pub struct QueryService {
    state: Arc<StateStore>,
    vectors: Arc<VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
}

impl QueryService {
    pub fn new(state: Arc<StateStore>, vectors: Arc<VectorStore>, embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { state, vectors, embedder }
    }

    /// Exact match; on miss, if the query contains a `.`, fall back to a
    /// suffix match on the last segment, preferring the first candidate
    /// whose qualified name has the query as a suffix and otherwise just
    /// the first candidate.
    pub fn find_symbol(&self, qualified_name: &str, include_source: bool) -> Result<Option<SymbolMatch>> {
        let mut entity = self.resolve_symbol(qualified_name)?;
        if !include_source {
            if let Some(e) = entity.as_mut() {
                e.source_text = None;
            }
        }
        let Some(entity) = entity else { return Ok(None) };
        self.to_symbol_match(entity).map(Some)
    }

    /// Resolves `qualified_name` then returns incoming edges (and, if
    /// requested, outgoing edges), each enriched with file/repository
    /// context.
    pub fn get_references(&self, qualified_name: &str, include_outgoing: bool) -> Result<Option<ReferencesResult>> {
        let Some(entity) = self.resolve_symbol(qualified_name)? else {
            return Ok(None);
        };

        let incoming = self
            .state
            .get_incoming_relations(&entity.id)?
            .into_iter()
            .map(|r| self.enrich_relation(r.relation_type.as_str(), r.line_number, r.context_snippet, &r.source_entity_id))
            .collect::<Result<Vec<_>>>()?;

        let outgoing = if include_outgoing {
            self.state
                .get_outgoing_relations(&entity.id)?
                .into_iter()
                .map(|r| {
                    let other_id = r.target_entity_id.clone().unwrap_or_else(|| r.source_entity_id.clone());
                    self.enrich_relation(r.relation_type.as_str(), r.line_number, r.context_snippet, &other_id)
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Some(ReferencesResult { incoming, outgoing }))
    }

    /// Forwards qualified queries straight to `get_references`. A bare
    /// simple name is suffix-matched across all entities, optionally
    /// narrowed by repository, preferring the shortest qualified name.
    pub fn find_usages(&self, simple_or_qualified_name: &str, repository: Option<&str>) -> Result<Option<ReferencesResult>> {
        if simple_or_qualified_name.contains('.') {
            return self.get_references(simple_or_qualified_name, false);
        }

        let mut candidates = self.state.get_entities_by_suffix(simple_or_qualified_name, 50)?;
        if let Some(repo_name) = repository {
            if let Some(repo) = self.state.get_repository_by_name(repo_name)? {
                candidates.retain(|c| c.repository_id == repo.id);
            } else {
                return Ok(None);
            }
        }
        candidates.sort_by_key(|c| c.qualified_name.len());
        let Some(best) = candidates.into_iter().next() else {
            return Ok(None);
        };
        self.get_references(&best.qualified_name, false)
    }

    /// Embeds `query`, searches the vector store under the given filters
    /// and enriches each hit with repository name and a source snippet.
    pub async fn search_code(
        &self,
        query: &str,
        limit: usize,
        repository: Option<&str>,
        language: Option<&str>,
        entity_type: Option<&str>,
        min_score: f64,
    ) -> Result<Vec<SearchHit>> {
        let repository_id = match repository {
            Some(name) => match self.state.get_repository_by_name(name)? {
                Some(repo) => Some(repo.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let query_vector = self.embedder.embed_query(query).await?;
        let filters = VectorFilters {
            repository_id,
            language: language.map(|s| s.to_string()),
            entity_type: entity_type.map(|s| s.to_string()),
        };
        let hits = self.vectors.search(&query_vector, limit, &filters, min_score)?;

        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let repository_name = self
                .state
                .get_repository(&hit.row.repository_id)?
                .map(|r| r.name)
                .unwrap_or_else(|| hit.row.repository_id.clone());
            let snippet = self
                .state
                .get_entity_by_id(&hit.row.id)?
                .and_then(|e| e.source_text)
                .map(|s| s.chars().take(2000).collect())
                .unwrap_or_else(|| hit.row.embedding_text.clone());
            out.push(SearchHit {
                qualified_name: hit.row.qualified_name,
                repository: repository_name,
                language: hit.row.language,
                file_path: hit.row.file_path,
                snippet,
                score: hit.score.clamp(0.0, 1.0),
            });
        }
        Ok(out)
    }

    fn resolve_symbol(&self, qualified_name: &str) -> Result<Option<CodeEntity>> {
        let exact = self.state.get_entities_by_qualified_name(qualified_name)?;
        if let Some(entity) = exact.into_iter().next() {
            return Ok(Some(entity));
        }
        if !qualified_name.contains('.') {
            return Ok(None);
        }
        let suffix = qualified_name.rsplit('.').next().unwrap_or(qualified_name);
        let candidates = self.state.get_entities_by_suffix(suffix, 50)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let preferred = candidates.iter().find(|c| c.qualified_name.ends_with(qualified_name));
        Ok(preferred.or_else(|| candidates.first()).cloned())
    }

    fn to_symbol_match(&self, entity: CodeEntity) -> Result<SymbolMatch> {
        let file = self.state.get_file(&entity.file_id)?;
        let repo = self.state.get_repository(&entity.repository_id)?;
        Ok(SymbolMatch {
            file_path: file.map(|f| f.path).unwrap_or_default(),
            repository_name: repo.map(|r| r.name).unwrap_or_else(|| entity.repository_id.clone()),
            entity,
        })
    }

    fn enrich_relation(
        &self,
        relation_type: &str,
        line_number: Option<u32>,
        context_snippet: Option<String>,
        other_entity_id: &str,
    ) -> Result<EnrichedRelation> {
        let (file_path, repository, other_qualified_name) = match self.state.get_entity_by_id(other_entity_id)? {
            Some(other) => {
                let file = self.state.get_file(&other.file_id)?;
                let repo = self.state.get_repository(&other.repository_id)?;
                (
                    file.map(|f| f.path).unwrap_or_default(),
                    repo.map(|r| r.name).unwrap_or_else(|| other.repository_id.clone()),
                    other.qualified_name,
                )
            }
            None => (String::new(), String::new(), String::new()),
        };
        Ok(EnrichedRelation {
            file_path,
            repository,
            line_number,
            relation_type: relation_type.to_string(),
            context_snippet,
            other_qualified_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcis_core::config::EmbeddingConfig;
    use mrcis_core::embedding::OpenAiEmbeddingClient;
    use mrcis_core::model::{EntityKind, IndexedFile, RelationType, RepositoryStatus, Visibility};

    fn entity(id: &str, repo: &str, file: &str, qualified_name: &str) -> CodeEntity {
        CodeEntity::new(id, repo, file, qualified_name, qualified_name.rsplit('.').next().unwrap(), EntityKind::Function, "python", 1, 2)
            .with_visibility(Visibility::Public)
    }

    fn service() -> QueryService {
        let state = Arc::new(StateStore::open_in_memory().unwrap());
        let vectors = Arc::new(VectorStore::open_in_memory(1536).unwrap());
        let embedder = Arc::new(OpenAiEmbeddingClient::new(EmbeddingConfig::default()).unwrap());
        QueryService::new(state, vectors, embedder)
    }

    #[test]
    fn find_symbol_falls_back_to_suffix_match() {
        let svc = service();
        svc.state.create_repository("repo-a", RepositoryStatus::Watching).unwrap();
        svc.state
            .upsert_file(&IndexedFile::new("f1", "repo-a", "mod.py", "abc", 10, chrono::Utc::now()))
            .unwrap();
        svc.state.add_entity(&entity("e1", "repo-a", "f1", "pkg.mod.helper")).unwrap();

        let found = svc.find_symbol("other.helper", true).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().entity.qualified_name, "pkg.mod.helper");
    }

    #[test]
    fn get_references_enriches_incoming_edges() {
        let svc = service();
        svc.state.create_repository("repo-a", RepositoryStatus::Watching).unwrap();
        svc.state
            .upsert_file(&IndexedFile::new("f1", "repo-a", "mod.py", "abc", 10, chrono::Utc::now()))
            .unwrap();
        svc.state.add_entity(&entity("e1", "repo-a", "f1", "pkg.mod.target")).unwrap();
        svc.state.add_entity(&entity("e2", "repo-a", "f1", "pkg.mod.caller")).unwrap();
        svc.state
            .add_relation(&mrcis_core::model::CodeRelation::resolved("r1", "e2", "e1", "pkg.mod.target", RelationType::Calls, false), "repo-a")
            .unwrap();

        let refs = svc.get_references("pkg.mod.target", false).unwrap().unwrap();
        assert_eq!(refs.incoming.len(), 1);
        assert_eq!(refs.incoming[0].other_qualified_name, "pkg.mod.caller");
    }

    #[test]
    fn find_usages_rejects_unknown_repository_filter() {
        let svc = service();
        let result = svc.find_usages("helper", Some("does-not-exist")).unwrap();
        assert!(result.is_none());
    }
}
