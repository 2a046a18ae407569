use serde::{Deserialize, Serialize};

/// Separator between the title and artist components of a track's natural
/// key. A unit separator cannot appear in normalized fields (control
/// characters are stripped), so keys never collide across components.
pub const NATURAL_KEY_SEPARATOR: char = '\u{1f}';

/// A persisted, owner-scoped track record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
    /// Duration formatted as `M:SS`.
    pub duration: Option<String>,
    pub genre: Option<String>,
    /// 1-5; non-positive source values are stored as null.
    pub rating: Option<i64>,
    /// ISO date string `YYYY-MM-DD`, format-validated but not parsed.
    pub date_added: Option<String>,
    /// Track identifier assigned by the originating DJ software.
    pub external_id: Option<String>,
    /// Decoded absolute filesystem path.
    pub file_location: Option<String>,
    pub created_at: i64,
}

/// A track candidate produced by the import parsers, not yet persisted.
/// The owner is stamped at insert time by the store, never carried here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewTrack {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub bpm: Option<f64>,
    pub musical_key: Option<String>,
    pub duration: Option<String>,
    pub genre: Option<String>,
    pub rating: Option<i64>,
    pub date_added: Option<String>,
    pub external_id: Option<String>,
    pub file_location: Option<String>,
}

impl NewTrack {
    /// The raw natural key enforced unique per owner by the store.
    /// Case-sensitive: near-duplicates that differ only in casing or
    /// whitespace are left for the duplicate engine to resolve.
    pub fn natural_key(&self) -> String {
        format!(
            "{}{}{}",
            self.title,
            NATURAL_KEY_SEPARATOR,
            self.artist.as_deref().unwrap_or("")
        )
    }
}

impl Track {
    pub fn natural_key(&self) -> String {
        format!(
            "{}{}{}",
            self.title,
            NATURAL_KEY_SEPARATOR,
            self.artist.as_deref().unwrap_or("")
        )
    }
}

/// Sort order for library listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOrder {
    /// Creation time ascending, insertion order as tie-break.
    CreatedAt,
    /// Title ascending.
    Title,
}

impl TrackOrder {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            TrackOrder::CreatedAt => "created_at ASC, id ASC",
            TrackOrder::Title => "title ASC, id ASC",
        }
    }
}
