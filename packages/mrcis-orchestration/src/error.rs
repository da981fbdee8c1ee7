//! Error types for the orchestration layer (§7): storage and embedding
//! failures are wrapped, not re-derived, since the store and embedding
//! client already classify retryability themselves.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("storage error: {0}")]
    Storage(#[from] mrcis_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] mrcis_core::CoreError),

    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("read-only: this instance does not hold the write lock")]
    ReadOnly,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Whether retrying the operation that produced this error might
    /// succeed (§7). Storage/embedding errors defer to their own
    /// `retryable` classification; everything else here is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrchestratorError::Core(e) => e.retryable,
            OrchestratorError::Storage(_) => true,
            _ => false,
        }
    }
}
