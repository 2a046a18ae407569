//! Debounced library search backing the selection screen.
//!
//! Every keystroke replaces the pending query; the store is only hit once
//! the input has been quiet for the debounce window. Responses carry the
//! sequence number of the keystroke that caused them, and a response older
//! than the last applied one is discarded, so a slow early query can never
//! overwrite the results of a later one.
//!
//! Genre and tempo filters are applied locally over the current result
//! set, without another store round trip.

use crate::library_store::{LibraryStore, Track};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Quiet window after the last keystroke before the store is queried.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Upper bound on results fetched per query.
pub const RESULT_CAP: usize = 500;

/// Tempo buckets for the local BPM filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpmBucket {
    /// Below 100 BPM.
    Slow,
    /// 100 to 119 BPM.
    Medium,
    /// 120 to 139 BPM.
    Fast,
    /// 140 BPM and up.
    VeryFast,
}

impl BpmBucket {
    pub fn contains(self, bpm: f64) -> bool {
        match self {
            BpmBucket::Slow => bpm < 100.0,
            BpmBucket::Medium => (100.0..120.0).contains(&bpm),
            BpmBucket::Fast => (120.0..140.0).contains(&bpm),
            BpmBucket::VeryFast => bpm >= 140.0,
        }
    }
}

/// Local filters over the fetched results. A track with no BPM never
/// matches a tempo filter.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub genre: Option<String>,
    pub bpm: Option<BpmBucket>,
}

impl SearchFilters {
    fn matches(&self, track: &Track) -> bool {
        if let Some(genre) = &self.genre {
            let track_genre = track.genre.as_deref().unwrap_or("");
            if !track_genre.eq_ignore_ascii_case(genre) {
                return false;
            }
        }
        if let Some(bucket) = self.bpm {
            match track.bpm {
                Some(bpm) if bucket.contains(bpm) => {}
                _ => return false,
            }
        }
        true
    }
}

struct ResultsState {
    tracks: Vec<Track>,
    applied_seq: u64,
}

pub struct LiveSearch {
    store: Arc<dyn LibraryStore>,
    owner_id: i64,
    debounce: Duration,
    filters: SearchFilters,
    next_seq: Arc<AtomicU64>,
    results: Arc<Mutex<ResultsState>>,
    pending: Option<JoinHandle<()>>,
}

impl LiveSearch {
    pub fn new(store: Arc<dyn LibraryStore>, owner_id: i64) -> Self {
        Self::with_debounce(store, owner_id, DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn LibraryStore>, owner_id: i64, debounce: Duration) -> Self {
        Self {
            store,
            owner_id,
            debounce,
            filters: SearchFilters::default(),
            next_seq: Arc::new(AtomicU64::new(0)),
            results: Arc::new(Mutex::new(ResultsState {
                tracks: Vec::new(),
                applied_seq: 0,
            })),
            pending: None,
        }
    }

    /// Feed the current query text. Cancels any pending lookup and starts
    /// a fresh debounce window. An empty query clears the results
    /// immediately without touching the store.
    pub fn on_input(&mut self, query: &str) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let query = query.trim().to_string();
        if query.is_empty() {
            let mut state = self.results.lock().unwrap();
            state.tracks.clear();
            state.applied_seq = seq;
            return;
        }

        let store = Arc::clone(&self.store);
        let owner_id = self.owner_id;
        let debounce = self.debounce;
        let results = Arc::clone(&self.results);

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let fetched = tokio::task::spawn_blocking(move || {
                store.search_tracks(owner_id, &query, RESULT_CAP)
            })
            .await;

            let tracks = match fetched {
                Ok(Ok(tracks)) => tracks,
                Ok(Err(err)) => {
                    warn!("library search failed: {err}");
                    return;
                }
                Err(err) => {
                    warn!("library search task failed: {err}");
                    return;
                }
            };

            let mut state = results.lock().unwrap();
            // A later keystroke already landed, this response is stale
            if seq <= state.applied_seq {
                return;
            }
            state.tracks = tracks;
            state.applied_seq = seq;
        }));
    }

    /// Wait for the pending lookup, if any, to finish. Used at teardown
    /// and in tests; a keystroke arriving afterwards starts a new one.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.pending.take() {
            // Aborted lookups are expected, not failures
            let _ = handle.await;
        }
    }

    pub fn set_genre_filter(&mut self, genre: Option<String>) {
        self.filters.genre = genre;
    }

    pub fn set_bpm_filter(&mut self, bucket: Option<BpmBucket>) {
        self.filters.bpm = bucket;
    }

    /// Current results with the local filters applied.
    pub fn results(&self) -> Vec<Track> {
        let state = self.results.lock().unwrap();
        state
            .tracks
            .iter()
            .filter(|t| self.filters.matches(t))
            .cloned()
            .collect()
    }
}
