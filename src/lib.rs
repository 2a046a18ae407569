//! Setlist Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod dedup;
pub mod import;
pub mod library_store;
pub mod normalize;
pub mod owner;
pub mod selection;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use dedup::{DedupConfig, DuplicateReviewEngine};
pub use import::{ImportConfig, ImportOutcome, ImportPipeline};
pub use library_store::{LibraryStore, SqliteLibraryStore, StoreError};
pub use server::{run_server, RequestsLoggingLevel};
