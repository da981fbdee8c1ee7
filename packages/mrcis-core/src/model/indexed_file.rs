//! A tracked file within a repository (§3 `IndexedFile`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
    PermanentFailure,
    Deleted,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Indexed => "indexed",
            FileStatus::Failed => "failed",
            FileStatus::PermanentFailure => "permanent_failure",
            FileStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub id: String,
    pub repository_id: String,
    /// Relative to repository root, forward-slash separated, unique within
    /// `repository_id`.
    pub path: String,
    /// Content hash (SHA-256, hex-encoded).
    pub checksum: String,
    pub file_size: u64,
    pub language: Option<String>,
    pub status: FileStatus,
    pub failure_count: u32,
    pub error_message: Option<String>,
    pub entity_count: u64,
    pub last_modified_at: chrono::DateTime<chrono::Utc>,
    pub last_indexed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl IndexedFile {
    pub fn new(
        id: impl Into<String>,
        repository_id: impl Into<String>,
        path: impl Into<String>,
        checksum: impl Into<String>,
        file_size: u64,
        last_modified_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            repository_id: repository_id.into(),
            path: path.into(),
            checksum: checksum.into(),
            file_size,
            language: None,
            status: FileStatus::Pending,
            failure_count: 0,
            error_message: None,
            entity_count: 0,
            last_modified_at,
            last_indexed_at: None,
        }
    }
}

/// A queued file awaiting pipeline processing (§3 "Queue entry"). Dequeued
/// by `(priority DESC, enqueued_at ASC)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub file_id: String,
    pub repository_id: String,
    pub priority: i32,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}
