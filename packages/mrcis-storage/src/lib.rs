//! Persistence for the code intelligence service: the single-writer
//! instance lock, the transactional state store (repositories, files,
//! queue, entities, relations, pending references) and the vector store
//! used for semantic search.

pub mod error;
pub mod lock;
pub mod state;
pub mod vector;

pub use error::{ErrorKind, Result, StorageError};
pub use lock::{lock_path, InstanceLock};
pub use state::{RecoveryReport, StateStore};
pub use vector::{VectorFilters, VectorRow, VectorSearchHit, VectorStore};
