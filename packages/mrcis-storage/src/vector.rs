//! Vector store (§4.C): a content-addressable table of entity embeddings,
//! backed by SQLite with the vector blob stored as little-endian `f32`s
//! and similarity computed in-process (no native vector extension is a
//! workspace dependency, so cosine distance is plain Rust over the
//! decoded `Vec<f32>`).

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRow {
    pub id: String,
    pub repository_id: String,
    pub file_id: String,
    pub qualified_name: String,
    pub simple_name: String,
    pub kind: String,
    pub language: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub vector: Vec<f32>,
    pub embedding_text: String,
    pub visibility: String,
    pub is_exported: bool,
    pub has_docstring: bool,
    pub signature: Option<String>,
    pub docstring: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilters {
    pub repository_id: Option<String>,
    pub language: Option<String>,
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub row: VectorRow,
    pub score: f64,
}

/// The embedding table. `dimensions` is fixed when the table is created
/// from configuration and every upserted row must match it.
pub struct VectorStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl VectorStore {
    pub fn open(path: &str, dimensions: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn), dimensions })
    }

    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn), dimensions })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vectors (
                id TEXT PRIMARY KEY,
                repository_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                qualified_name TEXT NOT NULL,
                simple_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                language TEXT NOT NULL,
                file_path TEXT NOT NULL,
                line_start INTEGER NOT NULL,
                line_end INTEGER NOT NULL,
                vector BLOB NOT NULL,
                embedding_text TEXT NOT NULL,
                visibility TEXT NOT NULL,
                is_exported INTEGER NOT NULL,
                has_docstring INTEGER NOT NULL,
                signature TEXT,
                docstring TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_vectors_file ON vectors(file_id);
            CREATE INDEX IF NOT EXISTS idx_vectors_repo ON vectors(repository_id);",
        )?;
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// For each row, deletes any existing row with that id, then inserts.
    /// Safe to call with an empty batch.
    pub fn upsert(&self, rows: &[VectorRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for row in rows {
            tx.execute("DELETE FROM vectors WHERE id = ?1", params![row.id])?;
            tx.execute(
                "INSERT INTO vectors (
                    id, repository_id, file_id, qualified_name, simple_name, kind, language,
                    file_path, line_start, line_end, vector, embedding_text, visibility,
                    is_exported, has_docstring, signature, docstring
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
                params![
                    row.id,
                    row.repository_id,
                    row.file_id,
                    row.qualified_name,
                    row.simple_name,
                    row.kind,
                    row.language,
                    row.file_path,
                    row.line_start,
                    row.line_end,
                    encode_vector(&row.vector),
                    row.embedding_text,
                    row.visibility,
                    row.is_exported,
                    row.has_docstring,
                    row.signature,
                    row.docstring,
                ],
            )?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Nearest neighbors by cosine similarity, restricted to `filters`,
    /// with `similarity = clamp01(1 - distance) >= min_score`.
    pub fn search(&self, query_vector: &[f32], limit: usize, filters: &VectorFilters, min_score: f64) -> Result<Vec<VectorSearchHit>> {
        let conn = self.conn.lock().unwrap();
        let mut sql = "SELECT id, repository_id, file_id, qualified_name, simple_name, kind, language, file_path, \
                       line_start, line_end, vector, embedding_text, visibility, is_exported, has_docstring, \
                       signature, docstring FROM vectors WHERE 1=1"
            .to_string();
        if let Some(repo) = &filters.repository_id {
            sql.push_str(&format!(" AND repository_id = '{}'", escape(repo)));
        }
        if let Some(lang) = &filters.language {
            sql.push_str(&format!(" AND language = '{}'", escape(lang)));
        }
        if let Some(kind) = &filters.entity_type {
            sql.push_str(&format!(" AND kind = '{}'", escape(kind)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |r| Self::row_from_sql(r))?;

        let mut hits: Vec<VectorSearchHit> = Vec::new();
        for row in rows {
            let row = row?;
            let score = clamp01(1.0 - cosine_distance(query_vector, &row.vector));
            if score >= min_score {
                hits.push(VectorSearchHit { row, score });
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    pub fn delete_by_file(&self, file_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM vectors WHERE file_id = ?1", params![file_id])?)
    }

    pub fn delete_by_repository(&self, repository_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM vectors WHERE repository_id = ?1", params![repository_id])?)
    }

    pub fn get(&self, id: &str) -> Result<Option<VectorRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, file_id, qualified_name, simple_name, kind, language, file_path, \
             line_start, line_end, vector, embedding_text, visibility, is_exported, has_docstring, \
             signature, docstring FROM vectors WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id], |r| Self::row_from_sql(r)).optional()?)
    }

    fn row_from_sql(r: &rusqlite::Row) -> rusqlite::Result<VectorRow> {
        let vector_blob: Vec<u8> = r.get(10)?;
        Ok(VectorRow {
            id: r.get(0)?,
            repository_id: r.get(1)?,
            file_id: r.get(2)?,
            qualified_name: r.get(3)?,
            simple_name: r.get(4)?,
            kind: r.get(5)?,
            language: r.get(6)?,
            file_path: r.get(7)?,
            line_start: r.get(8)?,
            line_end: r.get(9)?,
            vector: decode_vector(&vector_blob),
            embedding_text: r.get(11)?,
            visibility: r.get(12)?,
            is_exported: r.get(13)?,
            has_docstring: r.get(14)?,
            signature: r.get(15)?,
            docstring: r.get(16)?,
        })
    }
}

/// Single-quote doubling so no filter value reaches the store untrusted
/// (§4.C: "All filter string construction must escape single quotes").
fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    1.0 - similarity
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, vector: Vec<f32>) -> VectorRow {
        VectorRow {
            id: id.to_string(),
            repository_id: "repo-1".to_string(),
            file_id: "file-1".to_string(),
            qualified_name: format!("mod.{id}"),
            simple_name: id.to_string(),
            kind: "function".to_string(),
            language: "python".to_string(),
            file_path: "mod.py".to_string(),
            line_start: 1,
            line_end: 2,
            vector,
            embedding_text: format!("function: mod.{id}"),
            visibility: "public".to_string(),
            is_exported: true,
            has_docstring: false,
            signature: None,
            docstring: None,
        }
    }

    #[test]
    fn upsert_then_search_returns_closest_first() {
        let store = VectorStore::open_in_memory(3).unwrap();
        store.upsert(&[row("a", vec![1.0, 0.0, 0.0]), row("b", vec![0.0, 1.0, 0.0])]).unwrap();
        let hits = store.search(&[1.0, 0.0, 0.0], 10, &VectorFilters::default(), 0.0).unwrap();
        assert_eq!(hits[0].row.id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn upsert_replaces_existing_row_with_same_id() {
        let store = VectorStore::open_in_memory(3).unwrap();
        store.upsert(&[row("a", vec![1.0, 0.0, 0.0])]).unwrap();
        store.upsert(&[row("a", vec![0.0, 0.0, 1.0])]).unwrap();
        let fetched = store.get("a").unwrap().unwrap();
        assert_eq!(fetched.vector, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_upsert_is_a_no_op() {
        let store = VectorStore::open_in_memory(3).unwrap();
        assert_eq!(store.upsert(&[]).unwrap(), 0);
    }

    #[test]
    fn delete_by_file_removes_only_that_files_rows() {
        let store = VectorStore::open_in_memory(3).unwrap();
        let mut other = row("b", vec![0.0, 1.0, 0.0]);
        other.file_id = "file-2".to_string();
        store.upsert(&[row("a", vec![1.0, 0.0, 0.0]), other]).unwrap();
        store.delete_by_file("file-1").unwrap();
        assert!(store.get("a").unwrap().is_none());
        assert!(store.get("b").unwrap().is_some());
    }

    #[test]
    fn min_score_filters_out_distant_vectors() {
        let store = VectorStore::open_in_memory(3).unwrap();
        store.upsert(&[row("a", vec![1.0, 0.0, 0.0]), row("b", vec![-1.0, 0.0, 0.0])]).unwrap();
        let hits = store.search(&[1.0, 0.0, 0.0], 10, &VectorFilters::default(), 0.5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row.id, "a");
    }
}
