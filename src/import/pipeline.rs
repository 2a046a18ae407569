//! Bulk import with partial-failure tolerance.
//!
//! Two strategies over the same store:
//!
//! * [`ImportPipeline::import_bulk`] tries a single all-or-nothing batch
//!   insert and, when that fails, falls back to row-by-row insertion so
//!   one bad row does not sink the file.
//! * [`ImportPipeline::import_chunked`] splits candidates into fixed-size
//!   chunks and runs a bounded number of chunk inserts concurrently on
//!   blocking threads, so large files neither hold one giant transaction
//!   nor starve the runtime. Natural-key conflicts are counted as
//!   skipped, not failed, which makes re-imports idempotent.

use crate::library_store::{LibraryStore, NewTrack};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

fn default_chunk_size() -> usize {
    100
}

fn default_max_in_flight() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    /// Rows per insert chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks inserted concurrently per wave.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Outcome of the bulk-then-fallback strategy. Conflicts are errors here,
/// the caller asked for everything to go in.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct BulkImportOutcome {
    pub imported: usize,
    pub errors: Vec<String>,
}

/// Outcome of the chunked strategy.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub imported: usize,
    /// Rows rejected by the natural-key uniqueness constraint.
    pub skipped: usize,
    pub errors: Vec<String>,
    /// True when cancellation stopped the run before every chunk was
    /// attempted. Counts above reflect only the chunks that ran.
    pub cancelled: bool,
}

impl ImportOutcome {
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("imported {}", self.imported)];
        if self.skipped > 0 {
            parts.push(format!("skipped {}", self.skipped));
        }
        if !self.errors.is_empty() {
            parts.push(format!("failed {}", self.errors.len()));
        }
        if self.cancelled {
            parts.push("cancelled".to_string());
        }
        parts.join(", ")
    }
}

pub struct ImportPipeline {
    store: Arc<dyn LibraryStore>,
    config: ImportConfig,
}

impl ImportPipeline {
    pub fn new(store: Arc<dyn LibraryStore>, config: ImportConfig) -> Self {
        Self { store, config }
    }

    /// One all-or-nothing batch insert, falling back to row-by-row when
    /// the batch is rejected.
    pub fn import_bulk(&self, owner_id: i64, tracks: &[NewTrack]) -> BulkImportOutcome {
        match self.store.insert_tracks(owner_id, tracks) {
            Ok(inserted) => BulkImportOutcome {
                imported: inserted,
                errors: Vec::new(),
            },
            Err(batch_err) => {
                debug!("batch insert rejected, falling back to row-by-row: {batch_err}");
                let mut outcome = BulkImportOutcome::default();
                for track in tracks {
                    match self.store.insert_track(owner_id, track) {
                        Ok(_) => outcome.imported += 1,
                        Err(err) => outcome.errors.push(format!("{}: {err}", track.title)),
                    }
                }
                outcome
            }
        }
    }

    /// Chunked concurrent import. Chunks run in waves of at most
    /// `max_in_flight`; the token is checked between waves, so a cancel
    /// wastes at most one wave of work.
    pub async fn import_chunked(
        &self,
        owner_id: i64,
        tracks: Vec<NewTrack>,
        cancel: &CancellationToken,
    ) -> ImportOutcome {
        let chunk_size = self.config.chunk_size.max(1);
        let wave_size = self.config.max_in_flight.max(1);

        let mut chunks: Vec<Vec<NewTrack>> = tracks
            .chunks(chunk_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut outcome = ImportOutcome::default();
        while !chunks.is_empty() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            let wave: Vec<Vec<NewTrack>> =
                chunks.drain(..wave_size.min(chunks.len())).collect();
            let tasks = wave.into_iter().map(|chunk| {
                let store = Arc::clone(&self.store);
                spawn_blocking(move || insert_chunk(store.as_ref(), owner_id, &chunk))
            });

            for joined in join_all(tasks).await {
                match joined {
                    Ok(partial) => {
                        outcome.imported += partial.imported;
                        outcome.skipped += partial.skipped;
                        outcome.errors.extend(partial.errors);
                    }
                    Err(err) => {
                        warn!("import chunk task failed: {err}");
                        outcome.errors.push(format!("chunk task failed: {err}"));
                    }
                }
            }
        }
        outcome
    }
}

/// Insert one chunk: a single batch transaction first, row-by-row only
/// when the batch is rejected.
fn insert_chunk(store: &dyn LibraryStore, owner_id: i64, chunk: &[NewTrack]) -> ImportOutcome {
    match store.insert_tracks(owner_id, chunk) {
        Ok(inserted) => {
            return ImportOutcome {
                imported: inserted,
                ..ImportOutcome::default()
            }
        }
        Err(err) => debug!("chunk batch insert rejected, retrying row-by-row: {err}"),
    }

    let mut outcome = ImportOutcome::default();
    for track in chunk {
        match store.insert_track(owner_id, track) {
            Ok(_) => outcome.imported += 1,
            Err(err) if err.is_conflict() => outcome.skipped += 1,
            Err(err) => outcome.errors.push(format!("{}: {err}", track.title)),
        }
    }
    outcome
}
