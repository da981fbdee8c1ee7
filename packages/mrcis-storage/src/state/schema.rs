//! Versioned, idempotent schema migrations (§4.B: "Schema migrations are
//! versioned integers applied in order; a schema-version row records the
//! current version. All migrations are idempotent relative to the
//! recorded version.").
//!
//! Each table keeps a handful of indexed columns for the queries the
//! store actually issues (status, foreign keys, unique constraints) plus
//! a `json` column holding the full serialized domain record, so adding
//! a field to a `mrcis-core` model never requires a migration.

use rusqlite::Connection;

use crate::error::Result;

const CURRENT_VERSION: i32 = 1;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;
    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |r| r.get(0))
        .unwrap_or(0);

    if version < 1 {
        apply_v1(conn)?;
    }

    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [CURRENT_VERSION])?;
    Ok(())
}

fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS repositories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            repository_id TEXT NOT NULL,
            path TEXT NOT NULL,
            status TEXT NOT NULL,
            json TEXT NOT NULL,
            UNIQUE(repository_id, path)
        );
        CREATE INDEX IF NOT EXISTS idx_files_repo ON files(repository_id);
        CREATE INDEX IF NOT EXISTS idx_files_status ON files(repository_id, status);

        CREATE TABLE IF NOT EXISTS queue (
            file_id TEXT PRIMARY KEY,
            repository_id TEXT NOT NULL,
            priority INTEGER NOT NULL,
            enqueued_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_queue_order ON queue(priority DESC, enqueued_at ASC);

        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            repository_id TEXT NOT NULL,
            file_id TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            simple_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_entities_file ON entities(file_id);
        CREATE INDEX IF NOT EXISTS idx_entities_repo ON entities(repository_id);
        CREATE INDEX IF NOT EXISTS idx_entities_qname ON entities(qualified_name);
        CREATE INDEX IF NOT EXISTS idx_entities_sname ON entities(simple_name);

        CREATE TABLE IF NOT EXISTS relations (
            id TEXT PRIMARY KEY,
            source_entity_id TEXT NOT NULL,
            target_entity_id TEXT,
            repository_id TEXT NOT NULL,
            json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_entity_id);
        CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_entity_id);
        CREATE INDEX IF NOT EXISTS idx_relations_repo ON relations(repository_id);

        CREATE TABLE IF NOT EXISTS pending_references (
            id TEXT PRIMARY KEY,
            source_entity_id TEXT NOT NULL,
            status TEXT NOT NULL,
            json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pending_refs_status ON pending_references(status);
        CREATE INDEX IF NOT EXISTS idx_pending_refs_source ON pending_references(source_entity_id);
        ",
    )?;
    Ok(())
}
