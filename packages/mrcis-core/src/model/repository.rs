//! Repository record and its derived counts (§3 `Repository`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Pending,
    Indexing,
    Watching,
    Error,
    Paused,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Pending => "pending",
            RepositoryStatus::Indexing => "indexing",
            RepositoryStatus::Watching => "watching",
            RepositoryStatus::Error => "error",
            RepositoryStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCounts {
    pub files: u64,
    pub entities: u64,
    pub relations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub status: RepositoryStatus,
    pub last_indexed_commit: Option<String>,
    pub last_indexed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub counts: RepositoryCounts,
    pub error_message: Option<String>,
}

impl Repository {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: RepositoryStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            last_indexed_commit: None,
            last_indexed_at: None,
            counts: RepositoryCounts::default(),
            error_message: None,
        }
    }
}
