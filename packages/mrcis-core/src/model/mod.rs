//! The shared data model (§3): entities are a tagged union over kind
//! (§9 "Dynamic per-subclass entity types"); everything else is a thin
//! record type owned by [`crate::errors`]-propagating stores.

pub mod entities;
pub mod indexed_file;
pub mod pending_reference;
pub mod relations;
pub mod repository;

pub use entities::{
    ClassAttributes, CodeEntity, EntityAttributes, EntityKind, FunctionAttributes,
    ImportAttributes, MethodAttributes, Parameter, Visibility,
};
pub use indexed_file::{FileStatus, IndexedFile, QueueEntry};
pub use pending_reference::{PendingReference, ReferenceStatus};
pub use relations::{CodeRelation, RelationType, ResolutionStatus};
pub use repository::{Repository, RepositoryCounts, RepositoryStatus};
