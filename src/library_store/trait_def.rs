//! LibraryStore trait definition.
//!
//! Abstracts the owner-scoped record store so the import pipeline, the
//! duplicate engine and the selection search can run against either the
//! SQLite implementation or a test double.

use super::models::{NewTrack, Track, TrackOrder};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The natural-key uniqueness constraint rejected the row: the track
    /// already exists. Expected during re-imports, never fatal.
    #[error("record already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(rusqlite::Error),
    #[error("{0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, _) = &err {
            if ffi_err.code == rusqlite::ErrorCode::ConstraintViolation {
                // 2067 = SQLITE_CONSTRAINT_UNIQUE, 1555 = SQLITE_CONSTRAINT_PRIMARYKEY
                if ffi_err.extended_code == 2067 || ffi_err.extended_code == 1555 {
                    return StoreError::Conflict;
                }
            }
        }
        StoreError::Database(err)
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

/// Owner-scoped record store for tracks and per-client selections.
///
/// Every operation takes the owner id of the authenticated caller; rows
/// belonging to other owners are invisible to it.
pub trait LibraryStore: Send + Sync {
    // =========================================================================
    // Tracks
    // =========================================================================

    /// Insert a single track. Returns the assigned id.
    fn insert_track(&self, owner_id: i64, track: &NewTrack) -> Result<i64, StoreError>;

    /// Insert a batch of tracks in one transaction. All-or-nothing: any
    /// failure rolls the whole batch back and surfaces the error, so
    /// callers can fall back to row-by-row insertion.
    fn insert_tracks(&self, owner_id: i64, tracks: &[NewTrack]) -> Result<usize, StoreError>;

    /// List tracks with the given order, limit and offset.
    fn list_tracks(
        &self,
        owner_id: i64,
        order: TrackOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Track>, StoreError>;

    /// Case-insensitive substring search over title, artist and album,
    /// executed store-side.
    fn search_tracks(&self, owner_id: i64, query: &str, limit: usize)
        -> Result<Vec<Track>, StoreError>;

    /// Fetch specific tracks by id. Unknown ids are silently absent.
    fn get_tracks(&self, owner_id: i64, ids: &[i64]) -> Result<Vec<Track>, StoreError>;

    /// Delete the given tracks. Returns the number of rows removed.
    fn delete_tracks(&self, owner_id: i64, ids: &[i64]) -> Result<usize, StoreError>;

    fn count_tracks(&self, owner_id: i64) -> Result<usize, StoreError>;

    // =========================================================================
    // Client selections
    // =========================================================================

    /// The client's selected tracks, in selection order.
    fn get_selected_tracks(&self, owner_id: i64, client_id: &str)
        -> Result<Vec<Track>, StoreError>;

    /// Track ids currently selected for the client.
    fn get_selected_track_ids(
        &self,
        owner_id: i64,
        client_id: &str,
    ) -> Result<Vec<i64>, StoreError>;

    /// Append a track to the client's selection. Conflict if already selected.
    fn add_selection(&self, owner_id: i64, client_id: &str, track_id: i64)
        -> Result<(), StoreError>;

    /// Remove a track from the client's selection. Returns whether a row
    /// was actually removed.
    fn remove_selection(
        &self,
        owner_id: i64,
        client_id: &str,
        track_id: i64,
    ) -> Result<bool, StoreError>;

    /// Clear the client's whole selection. Returns the number of rows removed.
    fn clear_selection(&self, owner_id: i64, client_id: &str) -> Result<usize, StoreError>;
}
