//! Duplicate detection and review.
//!
//! The engine loads an owner's whole library in pages, finds duplicate
//! groups in one of two modes, and hands the groups to a [`ReviewSession`]
//! where the caller marks which tracks to keep. Resolving the session
//! deletes everything unmarked, in batches, halting on the first failure.

use super::similarity::similarity;
use crate::library_store::{LibraryStore, StoreError, Track, TrackOrder, NATURAL_KEY_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

fn default_threshold() -> f64 {
    0.70
}

fn default_page_size() -> usize {
    1000
}

fn default_delete_batch_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Minimum similarity score for two titles to land in one fuzzy group.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Tracks loaded per page while scanning the library.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Tracks deleted per batch when a session is resolved.
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            page_size: default_page_size(),
            delete_batch_size: default_delete_batch_size(),
        }
    }
}

/// Two or more tracks suspected to be the same song, in scan order
/// (creation order for exact scans, title order for fuzzy scans).
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub tracks: Vec<Track>,
}

pub struct DuplicateReviewEngine {
    store: Arc<dyn LibraryStore>,
    config: DedupConfig,
}

impl DuplicateReviewEngine {
    pub fn new(store: Arc<dyn LibraryStore>, config: DedupConfig) -> Self {
        Self { store, config }
    }

    /// All tracks for the owner, in the given order.
    fn load_all(&self, owner_id: i64, order: TrackOrder) -> Result<Vec<Track>, StoreError> {
        let page_size = self.config.page_size.max(1);
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .store
                .list_tracks(owner_id, order, page_size, offset)?;
            let page_len = page.len();
            tracks.extend(page);
            if page_len < page_size {
                break;
            }
            offset += page_len;
        }
        Ok(tracks)
    }

    /// Groups of tracks sharing a casefolded, trimmed title and artist.
    pub fn find_exact(&self, owner_id: i64) -> Result<Vec<DuplicateGroup>, StoreError> {
        let tracks = self.load_all(owner_id, TrackOrder::CreatedAt)?;
        let mut by_key: HashMap<String, Vec<Track>> = HashMap::new();
        let mut key_order = Vec::new();
        for track in tracks {
            let key = format!(
                "{}{}{}",
                track.title.trim().to_lowercase(),
                NATURAL_KEY_SEPARATOR,
                track.artist.as_deref().unwrap_or("").trim().to_lowercase()
            );
            if !by_key.contains_key(&key) {
                key_order.push(key.clone());
            }
            by_key.entry(key).or_default().push(track);
        }

        let groups: Vec<DuplicateGroup> = key_order
            .into_iter()
            .filter_map(|key| {
                let tracks = by_key.remove(&key)?;
                (tracks.len() >= 2).then_some(DuplicateGroup { tracks })
            })
            .collect();
        info!("Exact duplicate scan for owner {owner_id}: {} groups", groups.len());
        Ok(groups)
    }

    /// Groups of tracks whose titles score at or above the configured
    /// threshold against the group's seed track. Seeds are taken in title
    /// order, so near-identical titles sit next to their seed regardless
    /// of when they were imported. Quadratic over the library, which is
    /// fine at personal-collection sizes.
    pub fn find_fuzzy(&self, owner_id: i64) -> Result<Vec<DuplicateGroup>, StoreError> {
        let tracks = self.load_all(owner_id, TrackOrder::Title)?;
        let mut assigned = vec![false; tracks.len()];
        let mut groups = Vec::new();

        for seed in 0..tracks.len() {
            if assigned[seed] {
                continue;
            }
            let mut members = vec![seed];
            for candidate in seed + 1..tracks.len() {
                if assigned[candidate] {
                    continue;
                }
                let score = similarity(&tracks[seed].title, &tracks[candidate].title);
                if score >= self.config.threshold {
                    members.push(candidate);
                }
            }
            if members.len() >= 2 {
                for &index in &members {
                    assigned[index] = true;
                }
                groups.push(DuplicateGroup {
                    tracks: members.iter().map(|&i| tracks[i].clone()).collect(),
                });
            }
        }
        info!("Fuzzy duplicate scan for owner {owner_id}: {} groups", groups.len());
        Ok(groups)
    }

    /// Start a review over the given groups. Defaults to keeping the
    /// oldest track of every group.
    pub fn review(&self, owner_id: i64, groups: Vec<DuplicateGroup>) -> ReviewSession {
        ReviewSession::new(owner_id, groups)
    }

    /// Delete everything a session left unkept. Batches the deletes and
    /// halts on the first failing batch.
    pub fn resolve(&self, session: &ReviewSession) -> ResolveOutcome {
        let doomed = session.tracks_to_delete();
        let batch_size = self.config.delete_batch_size.max(1);
        let mut deleted = 0;
        for batch in doomed.chunks(batch_size) {
            match self.store.delete_tracks(session.owner_id, batch) {
                Ok(removed) => deleted += removed,
                Err(err) => {
                    return ResolveOutcome {
                        deleted,
                        error: Some(err.to_string()),
                    }
                }
            }
        }
        ResolveOutcome {
            deleted,
            error: None,
        }
    }
}

/// Result of resolving a review. `deleted` counts rows removed before any
/// failure.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ResolveOutcome {
    pub deleted: usize,
    pub error: Option<String>,
}

/// An in-progress duplicate review: per group, the set of track ids the
/// owner wants to keep. The keep set of a group can never become empty.
pub struct ReviewSession {
    owner_id: i64,
    groups: Vec<DuplicateGroup>,
    keep: Vec<HashSet<i64>>,
}

impl ReviewSession {
    fn new(owner_id: i64, groups: Vec<DuplicateGroup>) -> Self {
        let keep = groups
            .iter()
            .map(|group| {
                group
                    .tracks
                    .iter()
                    .min_by_key(|t| (t.created_at, t.id))
                    .map(|t| HashSet::from([t.id]))
                    .unwrap_or_default()
            })
            .collect();
        Self {
            owner_id,
            groups,
            keep,
        }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn is_kept(&self, group_index: usize, track_id: i64) -> bool {
        self.keep
            .get(group_index)
            .is_some_and(|set| set.contains(&track_id))
    }

    /// Flip the keep mark on one track. Refuses to unmark the last kept
    /// track of its group, and refuses tracks outside the group. Returns
    /// whether anything changed.
    pub fn toggle_keep(&mut self, group_index: usize, track_id: i64) -> bool {
        let Some(group) = self.groups.get(group_index) else {
            return false;
        };
        if !group.tracks.iter().any(|t| t.id == track_id) {
            return false;
        }
        let set = &mut self.keep[group_index];
        if set.contains(&track_id) {
            if set.len() == 1 {
                return false;
            }
            set.remove(&track_id);
        } else {
            set.insert(track_id);
        }
        true
    }

    /// Ids of every unkept track across all groups, in group order.
    pub fn tracks_to_delete(&self) -> Vec<i64> {
        self.groups
            .iter()
            .zip(&self.keep)
            .flat_map(|(group, kept)| {
                group
                    .tracks
                    .iter()
                    .filter(|t| !kept.contains(&t.id))
                    .map(|t| t.id)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library_store::{NewTrack, SqliteLibraryStore};
    use tempfile::TempDir;

    fn engine() -> (TempDir, Arc<SqliteLibraryStore>, DuplicateReviewEngine) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db"), 2).unwrap());
        let engine = DuplicateReviewEngine::new(store.clone(), DedupConfig::default());
        (dir, store, engine)
    }

    fn insert(store: &SqliteLibraryStore, title: &str, artist: Option<&str>) -> i64 {
        store
            .insert_track(
                1,
                &NewTrack {
                    title: title.to_string(),
                    artist: artist.map(|s| s.to_string()),
                    ..NewTrack::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn exact_mode_groups_casefolded_title_and_artist() {
        let (_dir, store, engine) = engine();
        let first = insert(&store, "Levels", Some("Avicii"));
        let second = insert(&store, "  levels ", Some("AVICII"));
        insert(&store, "Levels", Some("Someone Else"));
        insert(&store, "Other", None);

        let groups = engine.find_exact(1).unwrap();
        assert_eq!(groups.len(), 1);
        let ids: Vec<i64> = groups[0].tracks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn fuzzy_mode_groups_above_threshold_and_discards_singletons() {
        let (_dir, store, engine) = engine();
        // 11 of 14 characters contained, score 0.786
        insert(&store, "Blue Monday", Some("New Order"));
        insert(&store, "Blue Monday 88", Some("New Order"));
        // 9 of 17, score 0.529, stays out
        insert(&store, "Yesterday", None);
        insert(&store, "yesterday (remix)", None);
        insert(&store, "hello", None);

        let groups = engine.find_fuzzy(1).unwrap();
        assert_eq!(groups.len(), 1);
        let titles: Vec<&str> = groups[0].tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Blue Monday", "Blue Monday 88"]);
    }

    #[test]
    fn fuzzy_mode_scans_in_title_order_not_creation_order() {
        let (_dir, store, engine) = engine();
        // Creation order would seed on the longest title and pair it with
        // the 9-char one (9/12 = 0.75); title order seeds on the shortest
        // and pairs it with the 9-char one (7/9 = 0.78) instead.
        insert(&store, "abcdefghijkl", None);
        insert(&store, "abcdefg", None);
        insert(&store, "abcdefghi", None);

        let groups = engine.find_fuzzy(1).unwrap();
        assert_eq!(groups.len(), 1);
        let titles: Vec<&str> = groups[0].tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["abcdefg", "abcdefghi"]);
    }

    #[test]
    fn fuzzy_review_still_keeps_the_earliest_created() {
        let (_dir, store, engine) = engine();
        // The oldest record's title sorts last, so it is not group-first
        let earliest = insert(&store, "Blue Monday 88", Some("New Order"));
        insert(&store, "Blue Monday", Some("New Order"));

        let groups = engine.find_fuzzy(1).unwrap();
        assert_eq!(groups[0].tracks[0].title, "Blue Monday");

        let session = engine.review(1, groups);
        assert!(session.is_kept(0, earliest));
    }

    #[test]
    fn review_defaults_to_keeping_the_oldest() {
        let (_dir, store, engine) = engine();
        let old = insert(&store, "Song", Some("A"));
        let newer = insert(&store, "song", Some("a"));

        let groups = engine.find_exact(1).unwrap();
        let session = engine.review(1, groups);
        assert!(session.is_kept(0, old));
        assert!(!session.is_kept(0, newer));
        assert_eq!(session.tracks_to_delete(), vec![newer]);
    }

    #[test]
    fn keep_set_never_becomes_empty() {
        let (_dir, store, engine) = engine();
        let old = insert(&store, "Song", Some("A"));
        let newer = insert(&store, "song", Some("a"));

        let groups = engine.find_exact(1).unwrap();
        let mut session = engine.review(1, groups);

        // Cannot unmark the only kept track
        assert!(!session.toggle_keep(0, old));
        assert!(session.is_kept(0, old));

        // Marking the other, then unmarking the first, is fine
        assert!(session.toggle_keep(0, newer));
        assert!(session.toggle_keep(0, old));
        assert!(!session.is_kept(0, old));
        assert_eq!(session.tracks_to_delete(), vec![old]);

        // Foreign track ids are rejected
        assert!(!session.toggle_keep(0, 9999));
        assert!(!session.toggle_keep(5, old));
    }

    #[test]
    fn resolve_deletes_everything_unkept() {
        let (_dir, store, engine) = engine();
        insert(&store, "Dup", None);
        insert(&store, "dup", None);
        insert(&store, "DUP", None);
        insert(&store, "Keeper", None);

        let groups = engine.find_exact(1).unwrap();
        let session = engine.review(1, groups);
        let outcome = engine.resolve(&session);
        assert_eq!(outcome.deleted, 2);
        assert!(outcome.error.is_none());
        assert_eq!(store.count_tracks(1).unwrap(), 2);

        // A second scan finds nothing left to merge
        assert!(engine.find_exact(1).unwrap().is_empty());
    }

    /// Store double whose delete endpoint fails from the second batch on.
    struct FlakyDeleteStore {
        delete_calls: std::sync::atomic::AtomicUsize,
    }

    impl crate::library_store::LibraryStore for FlakyDeleteStore {
        fn insert_track(&self, _: i64, _: &NewTrack) -> Result<i64, StoreError> {
            unimplemented!()
        }
        fn insert_tracks(&self, _: i64, _: &[NewTrack]) -> Result<usize, StoreError> {
            unimplemented!()
        }
        fn list_tracks(
            &self,
            _: i64,
            _: TrackOrder,
            _: usize,
            _: usize,
        ) -> Result<Vec<Track>, StoreError> {
            unimplemented!()
        }
        fn search_tracks(&self, _: i64, _: &str, _: usize) -> Result<Vec<Track>, StoreError> {
            unimplemented!()
        }
        fn get_tracks(&self, _: i64, _: &[i64]) -> Result<Vec<Track>, StoreError> {
            unimplemented!()
        }
        fn delete_tracks(&self, _: i64, ids: &[i64]) -> Result<usize, StoreError> {
            let call = self
                .delete_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                Ok(ids.len())
            } else {
                Err(StoreError::Internal("disk full".to_string()))
            }
        }
        fn count_tracks(&self, _: i64) -> Result<usize, StoreError> {
            unimplemented!()
        }
        fn get_selected_tracks(&self, _: i64, _: &str) -> Result<Vec<Track>, StoreError> {
            unimplemented!()
        }
        fn get_selected_track_ids(&self, _: i64, _: &str) -> Result<Vec<i64>, StoreError> {
            unimplemented!()
        }
        fn add_selection(&self, _: i64, _: &str, _: i64) -> Result<(), StoreError> {
            unimplemented!()
        }
        fn remove_selection(&self, _: i64, _: &str, _: i64) -> Result<bool, StoreError> {
            unimplemented!()
        }
        fn clear_selection(&self, _: i64, _: &str) -> Result<usize, StoreError> {
            unimplemented!()
        }
    }

    fn bare_track(id: i64) -> Track {
        Track {
            id,
            owner_id: 1,
            title: format!("track {id}"),
            artist: None,
            album: None,
            bpm: None,
            musical_key: None,
            duration: None,
            genre: None,
            rating: None,
            date_added: None,
            external_id: None,
            file_location: None,
            created_at: id,
        }
    }

    #[test]
    fn resolve_halts_after_the_first_failing_batch() {
        let store = Arc::new(FlakyDeleteStore {
            delete_calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let engine = DuplicateReviewEngine::new(
            store.clone(),
            DedupConfig {
                delete_batch_size: 2,
                ..DedupConfig::default()
            },
        );

        // One group of six tracks, default keep leaves five doomed:
        // batches of [2, 2, 1], of which only the first lands.
        let groups = vec![DuplicateGroup {
            tracks: (1..=6).map(bare_track).collect(),
        }];
        let session = engine.review(1, groups);
        let outcome = engine.resolve(&session);

        assert_eq!(outcome.deleted, 2);
        assert_eq!(outcome.error.as_deref(), Some("disk full"));
        // The third batch was never attempted
        assert_eq!(
            store.delete_calls.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }

    #[test]
    fn pagination_covers_libraries_larger_than_one_page() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteLibraryStore::new(dir.path().join("library.db"), 2).unwrap());
        let engine = DuplicateReviewEngine::new(
            store.clone(),
            DedupConfig {
                page_size: 3,
                ..DedupConfig::default()
            },
        );
        for i in 0..10 {
            insert(&store, &format!("Unique {i}"), None);
        }
        insert(&store, "Twin", None);
        insert(&store, "twin", None);

        let groups = engine.find_exact(1).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tracks.len(), 2);
    }
}
