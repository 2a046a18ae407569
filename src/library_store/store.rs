//! SQLite-backed library store implementation.

use super::models::{NewTrack, Track, TrackOrder};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::trait_def::{LibraryStore, StoreError};
use crate::sqlite_persistence::migrate_if_needed;
use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

const TRACK_COLUMNS: &str = "id, owner_id, title, artist, album, bpm, musical_key, duration, \
                             genre, rating, date_added, external_id, file_location, created_at";

/// SQLite-backed store for tracks and client selections.
///
/// One write connection, a small round-robin pool of read connections, WAL
/// journaling. Uniqueness of (owner_id, natural_key) is enforced by the
/// schema and surfaces as `StoreError::Conflict`.
#[derive(Clone)]
pub struct SqliteLibraryStore {
    read_pool: Vec<Arc<Mutex<Connection>>>,
    write_conn: Arc<Mutex<Connection>>,
    read_index: Arc<AtomicUsize>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P, read_pool_size: usize) -> Result<Self> {
        let db_path = db_path.as_ref();

        let mut write_conn = Connection::open_with_flags(
            db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI
                | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open library database")?;

        migrate_if_needed(&mut write_conn, LIBRARY_VERSIONED_SCHEMAS)?;

        write_conn.pragma_update(None, "journal_mode", "WAL")?;
        write_conn.pragma_update(None, "foreign_keys", "ON")?;

        let track_count: i64 = write_conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))
            .unwrap_or(0);
        info!("Opened song library: {} tracks", track_count);

        let mut read_pool = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let read_conn = Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            read_conn.pragma_update(None, "journal_mode", "WAL")?;
            read_pool.push(Arc::new(Mutex::new(read_conn)));
        }

        Ok(SqliteLibraryStore {
            write_conn: Arc::new(Mutex::new(write_conn)),
            read_pool,
            read_index: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn get_read_conn(&self) -> Arc<Mutex<Connection>> {
        let index = self.read_index.fetch_add(1, Ordering::SeqCst) % self.read_pool.len();
        self.read_pool[index].clone()
    }

    fn parse_track_row(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        Ok(Track {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            title: row.get(2)?,
            artist: row.get(3)?,
            album: row.get(4)?,
            bpm: row.get(5)?,
            musical_key: row.get(6)?,
            duration: row.get(7)?,
            genre: row.get(8)?,
            rating: row.get(9)?,
            date_added: row.get(10)?,
            external_id: row.get(11)?,
            file_location: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    fn insert_track_tx(conn: &Connection, owner_id: i64, track: &NewTrack) -> Result<i64, StoreError> {
        conn.execute(
            "INSERT INTO tracks (owner_id, title, artist, album, bpm, musical_key, duration, \
             genre, rating, date_added, external_id, file_location, natural_key) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                owner_id,
                track.title,
                track.artist,
                track.album,
                track.bpm,
                track.musical_key,
                track.duration,
                track.genre,
                track.rating,
                track.date_added,
                track.external_id,
                track.file_location,
                track.natural_key(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// LIKE patterns treat `%`, `_` and the escape character literally.
    fn escape_like(query: &str) -> String {
        query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn insert_track(&self, owner_id: i64, track: &NewTrack) -> Result<i64, StoreError> {
        let conn = self.write_conn.lock().unwrap();
        Self::insert_track_tx(&conn, owner_id, track)
    }

    fn insert_tracks(&self, owner_id: i64, tracks: &[NewTrack]) -> Result<usize, StoreError> {
        let mut guard = self.write_conn.lock().unwrap();
        let tx = guard.transaction().map_err(StoreError::from)?;
        for track in tracks {
            Self::insert_track_tx(&tx, owner_id, track)?;
        }
        tx.commit().map_err(StoreError::from)?;
        Ok(tracks.len())
    }

    fn list_tracks(
        &self,
        owner_id: i64,
        order: TrackOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Track>, StoreError> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM tracks WHERE owner_id = ?1 ORDER BY {} LIMIT ?2 OFFSET ?3",
            TRACK_COLUMNS,
            order.to_sql()
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let tracks = stmt
            .query_map(params![owner_id, limit as i64, offset as i64], |row| {
                Self::parse_track_row(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn search_tracks(
        &self,
        owner_id: i64,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let pattern = format!("%{}%", Self::escape_like(query));
        let sql = format!(
            "SELECT {} FROM tracks WHERE owner_id = ?1 \
             AND (title LIKE ?2 ESCAPE '\\' OR artist LIKE ?2 ESCAPE '\\' \
             OR album LIKE ?2 ESCAPE '\\') \
             ORDER BY title ASC, id ASC LIMIT ?3",
            TRACK_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let tracks = stmt
            .query_map(params![owner_id, pattern, limit as i64], |row| {
                Self::parse_track_row(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn get_tracks(&self, owner_id: i64, ids: &[i64]) -> Result<Vec<Track>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM tracks WHERE owner_id = {} AND id IN ({}) ORDER BY id ASC",
            TRACK_COLUMNS, owner_id, placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let tracks = stmt
            .query_map(params_from_iter(ids.iter()), |row| Self::parse_track_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn delete_tracks(&self, owner_id: i64, ids: &[i64]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.write_conn.lock().unwrap();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM tracks WHERE owner_id = {} AND id IN ({})",
            owner_id, placeholders
        );
        let deleted = conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(deleted)
    }

    fn count_tracks(&self, owner_id: i64) -> Result<usize, StoreError> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE owner_id = ?1",
            params![owner_id],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_selected_tracks(
        &self,
        owner_id: i64,
        client_id: &str,
    ) -> Result<Vec<Track>, StoreError> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let sql = format!(
            "SELECT {} FROM tracks t \
             JOIN selections s ON s.track_id = t.id \
             WHERE s.owner_id = ?1 AND s.client_id = ?2 \
             ORDER BY s.position ASC",
            TRACK_COLUMNS
                .split(", ")
                .map(|c| format!("t.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let tracks = stmt
            .query_map(params![owner_id, client_id], |row| Self::parse_track_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    fn get_selected_track_ids(
        &self,
        owner_id: i64,
        client_id: &str,
    ) -> Result<Vec<i64>, StoreError> {
        let conn = self.get_read_conn();
        let conn = conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT track_id FROM selections WHERE owner_id = ?1 AND client_id = ?2 \
             ORDER BY position ASC",
        )?;
        let ids = stmt
            .query_map(params![owner_id, client_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn add_selection(
        &self,
        owner_id: i64,
        client_id: &str,
        track_id: i64,
    ) -> Result<(), StoreError> {
        let mut guard = self.write_conn.lock().unwrap();
        let tx = guard.transaction().map_err(StoreError::from)?;
        let next_position: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM selections \
             WHERE owner_id = ?1 AND client_id = ?2",
            params![owner_id, client_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "INSERT INTO selections (owner_id, client_id, track_id, position) \
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, client_id, track_id, next_position],
        )?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    fn remove_selection(
        &self,
        owner_id: i64,
        client_id: &str,
        track_id: i64,
    ) -> Result<bool, StoreError> {
        let conn = self.write_conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM selections WHERE owner_id = ?1 AND client_id = ?2 AND track_id = ?3",
            params![owner_id, client_id, track_id],
        )?;
        Ok(removed > 0)
    }

    fn clear_selection(&self, owner_id: i64, client_id: &str) -> Result<usize, StoreError> {
        let conn = self.write_conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM selections WHERE owner_id = ?1 AND client_id = ?2",
            params![owner_id, client_id],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteLibraryStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteLibraryStore::new(dir.path().join("library.db"), 2).unwrap();
        (dir, store)
    }

    fn track(title: &str, artist: Option<&str>) -> NewTrack {
        NewTrack {
            title: title.to_string(),
            artist: artist.map(|s| s.to_string()),
            ..NewTrack::default()
        }
    }

    #[test]
    fn insert_and_list_is_owner_scoped() {
        let (_dir, store) = test_store();
        store.insert_track(1, &track("Alpha", None)).unwrap();
        store.insert_track(2, &track("Beta", None)).unwrap();

        let owner1 = store.list_tracks(1, TrackOrder::CreatedAt, 100, 0).unwrap();
        assert_eq!(owner1.len(), 1);
        assert_eq!(owner1[0].title, "Alpha");
        assert_eq!(store.count_tracks(2).unwrap(), 1);
    }

    #[test]
    fn duplicate_natural_key_is_a_conflict() {
        let (_dir, store) = test_store();
        store.insert_track(1, &track("Alpha", Some("X"))).unwrap();
        let err = store.insert_track(1, &track("Alpha", Some("X"))).unwrap_err();
        assert!(err.is_conflict());

        // Same key under another owner is fine
        store.insert_track(2, &track("Alpha", Some("X"))).unwrap();
        // Different artist is a different natural key
        store.insert_track(1, &track("Alpha", Some("Y"))).unwrap();
    }

    #[test]
    fn bulk_insert_rolls_back_on_conflict() {
        let (_dir, store) = test_store();
        store.insert_track(1, &track("Existing", None)).unwrap();

        let batch = vec![track("Fresh", None), track("Existing", None)];
        let err = store.insert_tracks(1, &batch).unwrap_err();
        assert!(err.is_conflict());
        // "Fresh" must not have survived the failed transaction
        assert_eq!(store.count_tracks(1).unwrap(), 1);
    }

    #[test]
    fn search_matches_title_artist_album_case_insensitively() {
        let (_dir, store) = test_store();
        store.insert_track(1, &track("Dancing Queen", Some("ABBA"))).unwrap();
        store
            .insert_track(
                1,
                &NewTrack {
                    title: "Waterloo".to_string(),
                    album: Some("Arrival Dance Mix".to_string()),
                    ..NewTrack::default()
                },
            )
            .unwrap();
        store.insert_track(1, &track("Unrelated", None)).unwrap();

        let hits = store.search_tracks(1, "dAnC", 500).unwrap();
        assert_eq!(hits.len(), 2);

        // LIKE metacharacters in the query are literal
        let hits = store.search_tracks(1, "100%", 500).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn selection_round_trip_preserves_order() {
        let (_dir, store) = test_store();
        let a = store.insert_track(1, &track("A", None)).unwrap();
        let b = store.insert_track(1, &track("B", None)).unwrap();
        let c = store.insert_track(1, &track("C", None)).unwrap();

        store.add_selection(1, "client-1", b).unwrap();
        store.add_selection(1, "client-1", a).unwrap();
        store.add_selection(1, "client-1", c).unwrap();

        let ids = store.get_selected_track_ids(1, "client-1").unwrap();
        assert_eq!(ids, vec![b, a, c]);

        assert!(store.remove_selection(1, "client-1", a).unwrap());
        assert!(!store.remove_selection(1, "client-1", a).unwrap());
        assert_eq!(store.clear_selection(1, "client-1").unwrap(), 2);
    }

    #[test]
    fn selecting_twice_is_a_conflict() {
        let (_dir, store) = test_store();
        let a = store.insert_track(1, &track("A", None)).unwrap();
        store.add_selection(1, "c", a).unwrap();
        let err = store.add_selection(1, "c", a).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn deleting_a_track_cascades_to_selections() {
        let (_dir, store) = test_store();
        let a = store.insert_track(1, &track("A", None)).unwrap();
        store.add_selection(1, "c", a).unwrap();
        assert_eq!(store.delete_tracks(1, &[a]).unwrap(), 1);
        assert!(store.get_selected_track_ids(1, "c").unwrap().is_empty());
    }
}
