//! Orchestration layer for the MRCIS code intelligence service: the
//! indexing pipeline, the file watcher and its event router, the
//! reference resolver, the config reconciler, the query surface, and
//! `MrcisService`, which wires them all together under the single-writer
//! instance lock (§4, §5, §9).

pub mod error;
pub mod failure_policy;
pub mod pipeline;
pub mod query;
pub mod reconciler;
pub mod resolver;
pub mod service;
pub mod stats_updater;
pub mod watcher;

pub use error::{OrchestratorError, Result};
pub use failure_policy::FailurePolicy;
pub use pipeline::{IndexingPipeline, RepoRoots};
pub use query::{EnrichedRelation, QueryService, ReferencesResult, SearchHit, SymbolMatch};
pub use reconciler::{ConfigReconciler, ReconcileReport};
pub use resolver::ReferenceResolver;
pub use service::MrcisService;
pub use stats_updater::RepositoryStatsUpdater;
pub use watcher::FileWatcher;
