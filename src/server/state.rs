use axum::extract::FromRef;

use crate::dedup::DuplicateReviewEngine;
use crate::import::ImportPipeline;
use crate::library_store::LibraryStore;
use crate::owner::OwnerManager;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use super::RequestsLoggingLevel;

pub type GuardedLibraryStore = Arc<dyn LibraryStore>;
pub type GuardedOwnerManager = Arc<OwnerManager>;
pub type GuardedImportPipeline = Arc<ImportPipeline>;
pub type GuardedDedupEngine = Arc<DuplicateReviewEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub start_time: Instant,
    pub logging_level: RequestsLoggingLevel,
    pub library_store: GuardedLibraryStore,
    pub owner_manager: GuardedOwnerManager,
    pub import_pipeline: GuardedImportPipeline,
    pub dedup_engine: GuardedDedupEngine,
    pub hash: String,
    /// Cancelled when the process is shutting down; long imports check it
    /// between chunk waves.
    pub shutdown: CancellationToken,
}

impl FromRef<ServerState> for GuardedLibraryStore {
    fn from_ref(input: &ServerState) -> Self {
        input.library_store.clone()
    }
}

impl FromRef<ServerState> for GuardedOwnerManager {
    fn from_ref(input: &ServerState) -> Self {
        input.owner_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedDedupEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.dedup_engine.clone()
    }
}
