//! Error types for mrcis-core

use thiserror::Error;

/// Error kinds surfaced by extraction, scanning and embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Extractor raised an unrecoverable error (not a parse error).
    Extraction,
    /// Filesystem access failed while scanning.
    Scan,
    /// Embedding provider call failed; see `retryable`.
    Embedding,
    /// Configuration value failed validation.
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Extraction => "extraction",
            ErrorKind::Scan => "scan",
            ErrorKind::Embedding => "embedding",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core error type.
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct CoreError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
    /// Whether the caller should retry this operation (embedding errors only).
    pub retryable: bool,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retryable: false,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extraction, message)
    }

    pub fn scan(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Scan, message)
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Embedding, message).retryable(true)
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::new(
            ErrorKind::Embedding,
            format!("embedding provider returned {actual} dims, expected {expected}"),
        )
        .retryable(false)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::scan(format!("I/O error: {err}")).with_source(err)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
