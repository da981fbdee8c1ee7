//! State store (§4.B): the embedded transactional store of repositories,
//! files, the indexing queue, entities, relations and pending
//! references. Backed by SQLite (`rusqlite`, bundled); every table keeps
//! a `json` column holding the full serialized `mrcis-core` record next
//! to the handful of columns the store's own queries filter on.

mod schema;

use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use mrcis_core::model::{
    CodeEntity, CodeRelation, FileStatus, IndexedFile, PendingReference, QueueEntry,
    ReferenceStatus, RelationType, Repository, RepositoryCounts, RepositoryStatus,
};

use crate::error::{Result, StorageError};

pub struct StateStore {
    conn: Mutex<Connection>,
}

/// Counts of files recovered into a consistent state on writer startup
/// (§4.B "Crash recovery on startup").
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryReport {
    pub requeued_processing: usize,
    pub enqueued_pending: usize,
}

impl StateStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Runs `f` inside a transaction; commits on `Ok`, rolls back on `Err`
    /// (rollback happens implicitly when the `Transaction` guard drops
    /// without a `commit()` call).
    pub fn with_transaction<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ---------------------------------------------------------------
    // Repositories
    // ---------------------------------------------------------------

    pub fn create_repository(&self, name: &str, status: RepositoryStatus) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let repo = Repository::new(&id, name, status);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO repositories (id, name, status, json) VALUES (?1, ?2, ?3, ?4)",
            params![repo.id, repo.name, repo.status.as_str(), serde_json::to_string(&repo)?],
        )?;
        Ok(id)
    }

    pub fn get_repository(&self, id: &str) -> Result<Option<Repository>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT json FROM repositories WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn get_repository_by_name(&self, name: &str) -> Result<Option<Repository>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT json FROM repositories WHERE name = ?1", params![name], |r| r.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM repositories")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn update_repository_status(&self, id: &str, status: RepositoryStatus, error_message: Option<&str>) -> Result<()> {
        let mut repo = self.get_repository(id)?.ok_or_else(|| StorageError::not_found(format!("repository {id}")))?;
        repo.status = status;
        repo.error_message = error_message.map(|s| s.to_string());
        self.write_repository(&repo)
    }

    pub fn update_repository_stats(&self, id: &str, counts: RepositoryCounts, last_indexed_at: chrono::DateTime<Utc>, last_indexed_commit: Option<&str>, status: RepositoryStatus) -> Result<()> {
        let mut repo = self.get_repository(id)?.ok_or_else(|| StorageError::not_found(format!("repository {id}")))?;
        repo.counts = counts;
        repo.last_indexed_at = Some(last_indexed_at);
        repo.last_indexed_commit = last_indexed_commit.map(|s| s.to_string());
        repo.status = status;
        self.write_repository(&repo)
    }

    fn write_repository(&self, repo: &Repository) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE repositories SET name = ?2, status = ?3, json = ?4 WHERE id = ?1",
            params![repo.id, repo.name, repo.status.as_str(), serde_json::to_string(repo)?],
        )?;
        Ok(())
    }

    /// Cascades to files, entities, relations, queue entries and pending
    /// references belonging to the repository (§3 "a Repository owns its
    /// IndexedFiles (cascade delete)").
    pub fn delete_repository(&self, id: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let file_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM files WHERE repository_id = ?1")?;
                let rows = stmt.query_map(params![id], |r| r.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for file_id in &file_ids {
                tx.execute("DELETE FROM relations WHERE repository_id = ?1", params![id])?;
                tx.execute(
                    "DELETE FROM pending_references WHERE source_entity_id IN (SELECT id FROM entities WHERE file_id = ?1)",
                    params![file_id],
                )?;
                tx.execute("DELETE FROM entities WHERE file_id = ?1", params![file_id])?;
                tx.execute("DELETE FROM queue WHERE file_id = ?1", params![file_id])?;
            }
            tx.execute("DELETE FROM files WHERE repository_id = ?1", params![id])?;
            tx.execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Files
    // ---------------------------------------------------------------

    /// Conflict on `(repository_id, path)` updates checksum/size/mtime/
    /// status and returns the *existing* id rather than minting a new one.
    pub fn upsert_file(&self, file: &IndexedFile) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let existing_id: Option<String> = conn
            .query_row(
                "SELECT id FROM files WHERE repository_id = ?1 AND path = ?2",
                params![file.repository_id, file.path],
                |r| r.get(0),
            )
            .optional()?;

        if let Some(id) = existing_id {
            let mut updated = file.clone();
            updated.id = id.clone();
            conn.execute(
                "UPDATE files SET status = ?2, json = ?3 WHERE id = ?1",
                params![id, updated.status.as_str(), serde_json::to_string(&updated)?],
            )?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO files (id, repository_id, path, status, json) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![file.id, file.repository_id, file.path, file.status.as_str(), serde_json::to_string(file)?],
            )?;
            Ok(file.id.clone())
        }
    }

    pub fn get_file(&self, id: &str) -> Result<Option<IndexedFile>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn.query_row("SELECT json FROM files WHERE id = ?1", params![id], |r| r.get(0)).optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn get_file_by_path(&self, repository_id: &str, path: &str) -> Result<Option<IndexedFile>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT json FROM files WHERE repository_id = ?1 AND path = ?2", params![repository_id, path], |r| r.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn list_files_by_repository(&self, repository_id: &str) -> Result<Vec<IndexedFile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM files WHERE repository_id = ?1")?;
        let rows = stmt.query_map(params![repository_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Files in `failed` status whose `failure_count` is still below the
    /// caller-supplied retry ceiling.
    pub fn get_retryable_failed(&self, repository_id: &str, max_retries: u32) -> Result<Vec<IndexedFile>> {
        Ok(self
            .list_files_by_repository(repository_id)?
            .into_iter()
            .filter(|f| f.status == FileStatus::Failed && f.failure_count < max_retries)
            .collect())
    }

    /// Resets every file in the repository to `pending`, optionally
    /// clearing `failure_count`, and returns the count affected.
    pub fn mark_repository_files_pending(&self, repository_id: &str, reset_failures: bool) -> Result<usize> {
        self.with_transaction(|tx| {
            let mut stmt = tx.prepare("SELECT json FROM files WHERE repository_id = ?1")?;
            let files: Vec<IndexedFile> = stmt
                .query_map(params![repository_id], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .map(|j| serde_json::from_str(&j))
                .collect::<serde_json::Result<Vec<_>>>()
                .map_err(StorageError::from)?;
            let count = files.len();
            for mut file in files {
                file.status = FileStatus::Pending;
                if reset_failures {
                    file.failure_count = 0;
                    file.error_message = None;
                }
                tx.execute(
                    "UPDATE files SET status = ?2, json = ?3 WHERE id = ?1",
                    params![file.id, file.status.as_str(), serde_json::to_string(&file)?],
                )?;
            }
            Ok(count)
        })
    }

    pub fn update_file_status(&self, id: &str, status: FileStatus) -> Result<()> {
        let mut file = self.get_file(id)?.ok_or_else(|| StorageError::not_found(format!("file {id}")))?;
        file.status = status;
        self.write_file(&file)
    }

    pub fn update_file_indexed(&self, id: &str, entity_count: u64) -> Result<()> {
        let mut file = self.get_file(id)?.ok_or_else(|| StorageError::not_found(format!("file {id}")))?;
        file.status = FileStatus::Indexed;
        file.entity_count = entity_count;
        file.last_indexed_at = Some(Utc::now());
        file.error_message = None;
        self.write_file(&file)
    }

    pub fn update_file_failure(&self, id: &str, status: FileStatus, failure_count: u32, error_message: &str) -> Result<()> {
        let mut file = self.get_file(id)?.ok_or_else(|| StorageError::not_found(format!("file {id}")))?;
        file.status = status;
        file.failure_count = failure_count;
        file.error_message = Some(error_message.to_string());
        self.write_file(&file)
    }

    fn write_file(&self, file: &IndexedFile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE files SET status = ?2, json = ?3 WHERE id = ?1",
            params![file.id, file.status.as_str(), serde_json::to_string(file)?],
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Queue
    // ---------------------------------------------------------------

    /// Idempotent per `file_id`: re-enqueuing an already-queued file is a
    /// no-op (its priority/timestamp are left as first queued).
    pub fn enqueue(&self, file_id: &str, repository_id: &str, priority: i32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO queue (file_id, repository_id, priority, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
            params![file_id, repository_id, priority, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Atomically removes and returns the highest-priority, oldest queue
    /// entry (`priority DESC, enqueued_at ASC`).
    pub fn dequeue_next(&self) -> Result<Option<QueueEntry>> {
        self.with_transaction(|tx| {
            let entry: Option<(String, String, i32, String)> = tx
                .query_row(
                    "SELECT file_id, repository_id, priority, enqueued_at FROM queue ORDER BY priority DESC, enqueued_at ASC LIMIT 1",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
                )
                .optional()?;
            let Some((file_id, repository_id, priority, enqueued_at)) = entry else {
                return Ok(None);
            };
            tx.execute("DELETE FROM queue WHERE file_id = ?1", params![file_id])?;
            let enqueued_at = chrono::DateTime::parse_from_rfc3339(&enqueued_at)
                .map_err(|e| StorageError::database(format!("corrupt queue timestamp: {e}")))?
                .with_timezone(&Utc);
            Ok(Some(QueueEntry { file_id, repository_id, priority, enqueued_at }))
        })
    }

    /// Enqueues every `pending` file in the repository; returns the count
    /// newly enqueued (already-queued files are skipped by the idempotent
    /// insert).
    pub fn enqueue_pending_files(&self, repository_id: &str) -> Result<usize> {
        let pending: Vec<IndexedFile> = self
            .list_files_by_repository(repository_id)?
            .into_iter()
            .filter(|f| f.status == FileStatus::Pending)
            .collect();
        for file in &pending {
            self.enqueue(&file.id, repository_id, 0)?;
        }
        Ok(pending.len())
    }

    pub fn queue_length(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM queue", [], |r| r.get(0))?)
    }

    /// Alias for `queue_length`, named separately per §4.B's interface
    /// listing (`get_queue_size`), kept distinct so callers that already
    /// match the spec's exact method names compile unchanged.
    pub fn get_queue_size(&self) -> Result<u64> {
        self.queue_length()
    }

    // ---------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------

    /// Upsert by id: replaces any existing entity with the same id.
    pub fn add_entity(&self, entity: &CodeEntity) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO entities (id, repository_id, file_id, qualified_name, simple_name, kind, json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET repository_id = excluded.repository_id, file_id = excluded.file_id,
                qualified_name = excluded.qualified_name, simple_name = excluded.simple_name,
                kind = excluded.kind, json = excluded.json",
            params![
                entity.id,
                entity.repository_id,
                entity.file_id,
                entity.qualified_name,
                entity.simple_name,
                entity.kind.as_str(),
                serde_json::to_string(entity)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_entity_by_id(&self, id: &str) -> Result<Option<CodeEntity>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn.query_row("SELECT json FROM entities WHERE id = ?1", params![id], |r| r.get(0)).optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    /// Exact qualified-name lookup. Returns one entity when several share
    /// a qualified name (overloads/duplicates); tie-break is unspecified
    /// here and left to callers (§4.L applies its own fallback rules).
    pub fn get_entity_by_qualified_name(&self, qualified_name: &str) -> Result<Option<CodeEntity>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT json FROM entities WHERE qualified_name = ?1 ORDER BY id ASC LIMIT 1", params![qualified_name], |r| r.get(0))
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn get_entities_by_qualified_name(&self, qualified_name: &str) -> Result<Vec<CodeEntity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM entities WHERE qualified_name = ?1")?;
        let rows = stmt.query_map(params![qualified_name], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Entities whose qualified name ends with `suffix` (§4.J candidate
    /// lookup's suffix-match fallback).
    pub fn get_entities_by_suffix(&self, suffix: &str, limit: usize) -> Result<Vec<CodeEntity>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{suffix}");
        let mut stmt = conn.prepare("SELECT json FROM entities WHERE qualified_name LIKE ?1 ESCAPE '\\' LIMIT ?2")?;
        let rows = stmt.query_map(params![pattern, limit as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn get_entities_for_file(&self, file_id: &str) -> Result<Vec<CodeEntity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM entities WHERE file_id = ?1")?;
        let rows = stmt.query_map(params![file_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Cascades to the entities' outgoing/incoming edges and pending
    /// references (§3 "replaced atomically when the file is re-indexed").
    pub fn delete_entities_for_file(&self, file_id: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let entity_ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT id FROM entities WHERE file_id = ?1")?;
                let rows = stmt.query_map(params![file_id], |r| r.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for entity_id in &entity_ids {
                tx.execute("DELETE FROM relations WHERE source_entity_id = ?1 OR target_entity_id = ?1", params![entity_id])?;
                tx.execute("DELETE FROM pending_references WHERE source_entity_id = ?1", params![entity_id])?;
            }
            tx.execute("DELETE FROM entities WHERE file_id = ?1", params![file_id])?;
            Ok(())
        })
    }

    pub fn update_entity_vector_id(&self, id: &str, vector_id: &str) -> Result<()> {
        let mut entity = self.get_entity_by_id(id)?.ok_or_else(|| StorageError::not_found(format!("entity {id}")))?;
        entity.vector_id = Some(vector_id.to_string());
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE entities SET json = ?2 WHERE id = ?1", params![id, serde_json::to_string(&entity)?])?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Relations & pending references
    // ---------------------------------------------------------------

    pub fn add_relation(&self, relation: &CodeRelation, repository_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO relations (id, source_entity_id, target_entity_id, repository_id, json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET source_entity_id = excluded.source_entity_id,
                target_entity_id = excluded.target_entity_id, json = excluded.json",
            params![relation.id, relation.source_entity_id, relation.target_entity_id, repository_id, serde_json::to_string(relation)?],
        )?;
        Ok(())
    }

    pub fn get_incoming_relations(&self, entity_id: &str) -> Result<Vec<CodeRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM relations WHERE target_entity_id = ?1")?;
        let rows = stmt.query_map(params![entity_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn get_outgoing_relations(&self, entity_id: &str) -> Result<Vec<CodeRelation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM relations WHERE source_entity_id = ?1")?;
        let rows = stmt.query_map(params![entity_id], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    pub fn add_pending_reference(&self, reference: &PendingReference) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pending_references (id, source_entity_id, status, json)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status, json = excluded.json",
            params![reference.id, reference.source_entity_id, status_str(reference.status), serde_json::to_string(reference)?],
        )?;
        Ok(())
    }

    pub fn get_pending_references(&self, limit: usize) -> Result<Vec<PendingReference>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM pending_references WHERE status = 'pending' LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |r| r.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    /// Creates the resolved edge and marks the pending reference resolved
    /// atomically; a no-op (besides returning `Ok`) if it is already
    /// resolved, so a second resolver pass never duplicates the edge.
    pub fn resolve_reference(&self, reference_id: &str, target_entity_id: &str, source_repository_id: &str, target_repository_id: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let json: String = tx.query_row("SELECT json FROM pending_references WHERE id = ?1", params![reference_id], |r| r.get(0))?;
            let mut reference: PendingReference = serde_json::from_str(&json)?;
            if reference.status == ReferenceStatus::Resolved {
                return Ok(());
            }

            let relation = CodeRelation::resolved(
                uuid::Uuid::new_v4().to_string(),
                reference.source_entity_id.clone(),
                target_entity_id,
                reference.target_qualified_name.clone(),
                reference.relation_type,
                source_repository_id != target_repository_id,
            )
            .with_line(reference.line_number);
            let relation = match &reference.context_snippet {
                Some(c) => relation.with_context(c.clone()),
                None => relation,
            };

            tx.execute(
                "INSERT INTO relations (id, source_entity_id, target_entity_id, repository_id, json) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![relation.id, relation.source_entity_id, relation.target_entity_id, source_repository_id, serde_json::to_string(&relation)?],
            )?;

            reference.status = ReferenceStatus::Resolved;
            reference.resolved_target_id = Some(target_entity_id.to_string());
            reference.resolved_at = Some(Utc::now());
            tx.execute(
                "UPDATE pending_references SET status = ?2, json = ?3 WHERE id = ?1",
                params![reference.id, status_str(reference.status), serde_json::to_string(&reference)?],
            )?;
            Ok(())
        })
    }

    /// Increments `attempts`; marks `unresolved` once `max_attempts` is
    /// reached, stopping further retries.
    pub fn mark_reference_unresolved(&self, reference_id: &str, max_attempts: u32) -> Result<()> {
        self.with_transaction(|tx| {
            let json: String = tx.query_row("SELECT json FROM pending_references WHERE id = ?1", params![reference_id], |r| r.get(0))?;
            let mut reference: PendingReference = serde_json::from_str(&json)?;
            reference.attempts += 1;
            if reference.attempts >= max_attempts {
                reference.status = ReferenceStatus::Unresolved;
            }
            tx.execute(
                "UPDATE pending_references SET status = ?2, json = ?3 WHERE id = ?1",
                params![reference.id, status_str(reference.status), serde_json::to_string(&reference)?],
            )?;
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Counts
    // ---------------------------------------------------------------

    pub fn count_entities(&self, repository_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM entities WHERE repository_id = ?1", params![repository_id], |r| r.get(0))?)
    }

    pub fn count_relations(&self, repository_id: &str) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM relations WHERE repository_id = ?1", params![repository_id], |r| r.get(0))?)
    }

    pub fn count_pending_files(&self, repository_id: &str) -> Result<u64> {
        self.count_files_with_status(repository_id, FileStatus::Pending)
    }

    pub fn count_failed_files(&self, repository_id: &str) -> Result<u64> {
        self.count_files_with_status(repository_id, FileStatus::Failed)
    }

    pub fn count_indexed_files(&self, repository_id: &str) -> Result<u64> {
        self.count_files_with_status(repository_id, FileStatus::Indexed)
    }

    fn count_files_with_status(&self, repository_id: &str, status: FileStatus) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM files WHERE repository_id = ?1 AND status = ?2",
            params![repository_id, status.as_str()],
            |r| r.get(0),
        )?)
    }

    // ---------------------------------------------------------------
    // Crash recovery
    // ---------------------------------------------------------------

    /// §4.B crash recovery: any `processing` file moves back to
    /// `pending`; any `pending` file lacking a queue entry is enqueued.
    pub fn recover(&self) -> Result<RecoveryReport> {
        self.with_transaction(|tx| {
            let processing: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT id, repository_id FROM files WHERE status = 'processing'")?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for (file_id, _) in &processing {
                let json: String = tx.query_row("SELECT json FROM files WHERE id = ?1", params![file_id], |r| r.get(0))?;
                let mut file: IndexedFile = serde_json::from_str(&json)?;
                file.status = FileStatus::Pending;
                tx.execute(
                    "UPDATE files SET status = 'pending', json = ?2 WHERE id = ?1",
                    params![file_id, serde_json::to_string(&file)?],
                )?;
            }

            let pending_without_queue: Vec<(String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, repository_id FROM files WHERE status = 'pending' AND id NOT IN (SELECT file_id FROM queue)",
                )?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            for (file_id, repository_id) in &pending_without_queue {
                tx.execute(
                    "INSERT OR IGNORE INTO queue (file_id, repository_id, priority, enqueued_at) VALUES (?1, ?2, 0, ?3)",
                    params![file_id, repository_id, Utc::now().to_rfc3339()],
                )?;
            }

            Ok(RecoveryReport {
                requeued_processing: processing.len(),
                enqueued_pending: pending_without_queue.len(),
            })
        })
    }
}

fn status_str(status: ReferenceStatus) -> &'static str {
    match status {
        ReferenceStatus::Pending => "pending",
        ReferenceStatus::Resolved => "resolved",
        ReferenceStatus::Unresolved => "unresolved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrcis_core::model::{EntityKind, Visibility};

    fn entity(id: &str, qualified_name: &str, kind: EntityKind) -> CodeEntity {
        CodeEntity::new(id, "repo-1", "file-1", qualified_name, qualified_name, kind, "python", 1, 1).with_visibility(Visibility::Public)
    }

    #[test]
    fn create_and_fetch_repository_roundtrips() {
        let store = StateStore::open_in_memory().unwrap();
        let id = store.create_repository("demo", RepositoryStatus::Pending).unwrap();
        let fetched = store.get_repository(&id).unwrap().unwrap();
        assert_eq!(fetched.name, "demo");
        assert_eq!(fetched.status, RepositoryStatus::Pending);
    }

    #[test]
    fn upsert_file_is_idempotent_on_repo_and_path() {
        let store = StateStore::open_in_memory().unwrap();
        let repo_id = store.create_repository("demo", RepositoryStatus::Pending).unwrap();
        let file = IndexedFile::new("f1", &repo_id, "a.py", "checksum1", 10, Utc::now());
        let id1 = store.upsert_file(&file).unwrap();
        let mut file2 = file.clone();
        file2.id = "should-be-ignored".to_string();
        file2.checksum = "checksum2".to_string();
        let id2 = store.upsert_file(&file2).unwrap();
        assert_eq!(id1, id2);
        let fetched = store.get_file(&id1).unwrap().unwrap();
        assert_eq!(fetched.checksum, "checksum2");
    }

    #[test]
    fn queue_dequeues_by_priority_then_age() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue("low", "repo-1", 0).unwrap();
        store.enqueue("high", "repo-1", 10).unwrap();
        let next = store.dequeue_next().unwrap().unwrap();
        assert_eq!(next.file_id, "high");
        assert_eq!(store.queue_length().unwrap(), 1);
    }

    #[test]
    fn enqueue_is_idempotent_per_file() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue("f1", "repo-1", 0).unwrap();
        store.enqueue("f1", "repo-1", 5).unwrap();
        assert_eq!(store.queue_length().unwrap(), 1);
    }

    #[test]
    fn delete_entities_for_file_cascades_relations_and_pending_refs() {
        let store = StateStore::open_in_memory().unwrap();
        let e1 = entity("e1", "mod.Foo", EntityKind::Class);
        let e2 = entity("e2", "mod.Bar", EntityKind::Class);
        store.add_entity(&e1).unwrap();
        store.add_entity(&e2).unwrap();
        let relation = CodeRelation::resolved("r1", "e1", "e2", "mod.Bar", RelationType::Extends, false);
        store.add_relation(&relation, "repo-1").unwrap();
        let pending = PendingReference::new("p1", "e1", "mod.Foo", "repo-1", "mod.Baz", RelationType::Calls, 1);
        store.add_pending_reference(&pending).unwrap();

        store.delete_entities_for_file("file-1").unwrap();

        assert!(store.get_entity_by_id("e1").unwrap().is_none());
        assert!(store.get_outgoing_relations("e1").unwrap().is_empty());
        assert!(store.get_pending_references(10).unwrap().is_empty());
    }

    #[test]
    fn resolve_reference_creates_edge_and_is_idempotent() {
        let store = StateStore::open_in_memory().unwrap();
        let e1 = entity("e1", "mod.Foo", EntityKind::Function);
        let e2 = entity("e2", "mod.Bar", EntityKind::Function);
        store.add_entity(&e1).unwrap();
        store.add_entity(&e2).unwrap();
        let pending = PendingReference::new("p1", "e1", "mod.Foo", "repo-1", "mod.Bar", RelationType::Calls, 3);
        store.add_pending_reference(&pending).unwrap();

        store.resolve_reference("p1", "e2", "repo-1", "repo-1").unwrap();
        assert_eq!(store.get_outgoing_relations("e1").unwrap().len(), 1);

        // second pass is a no-op, not a duplicate edge
        store.resolve_reference("p1", "e2", "repo-1", "repo-1").unwrap();
        assert_eq!(store.get_outgoing_relations("e1").unwrap().len(), 1);
    }

    #[test]
    fn mark_reference_unresolved_stops_after_max_attempts() {
        let store = StateStore::open_in_memory().unwrap();
        let pending = PendingReference::new("p1", "e1", "mod.Foo", "repo-1", "mod.DoesNotExist", RelationType::Calls, 1);
        store.add_pending_reference(&pending).unwrap();
        store.mark_reference_unresolved("p1", 3).unwrap();
        store.mark_reference_unresolved("p1", 3).unwrap();
        assert_eq!(store.get_pending_references(10).unwrap().len(), 1);
        store.mark_reference_unresolved("p1", 3).unwrap();
        assert!(store.get_pending_references(10).unwrap().is_empty());
    }

    #[test]
    fn recover_requeues_processing_and_enqueues_orphaned_pending() {
        let store = StateStore::open_in_memory().unwrap();
        let repo_id = store.create_repository("demo", RepositoryStatus::Pending).unwrap();
        let mut file = IndexedFile::new("f1", &repo_id, "a.py", "c1", 1, Utc::now());
        file.status = FileStatus::Processing;
        store.upsert_file(&file).unwrap();
        let report = store.recover().unwrap();
        assert_eq!(report.requeued_processing, 1);
        let fetched = store.get_file_by_path(&repo_id, "a.py").unwrap().unwrap();
        assert_eq!(fetched.status, FileStatus::Pending);
        assert_eq!(store.queue_length().unwrap(), 1);
    }
}
