//! Extended M3U playlist export.
//!
//! Tracks without a file location cannot be referenced by a player and
//! are omitted; the outcome reports how many were left out. A selection
//! with no locatable track at all is an error, an empty playlist file
//! helps nobody.

use crate::library_store::Track;
use thiserror::Error;

/// MIME type for M3U playlist downloads.
pub const PLAYLIST_MIME: &str = "audio/x-mpegurl";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("none of the {0} selected tracks has a file location")]
    NoLocations(usize),
}

/// A rendered playlist ready to be served as a download.
#[derive(Debug, PartialEq, Eq)]
pub struct PlaylistExport {
    pub filename: String,
    pub content: String,
    /// Selected tracks left out for lack of a file location.
    pub omitted: usize,
}

/// `M:SS` back to whole seconds, `-1` when absent or unparseable, which
/// is what EXTINF specifies for an unknown length.
fn extinf_seconds(duration: Option<&str>) -> i64 {
    let Some(duration) = duration else {
        return -1;
    };
    let mut parts = duration.splitn(2, ':');
    let minutes: i64 = match parts.next().and_then(|p| p.parse().ok()) {
        Some(m) => m,
        None => return -1,
    };
    let seconds: i64 = match parts.next().and_then(|p| p.parse().ok()) {
        Some(s) => s,
        None => return -1,
    };
    minutes * 60 + seconds
}

fn extinf_label(track: &Track) -> String {
    match track.artist.as_deref() {
        Some(artist) => format!("{} - {}", artist, track.title),
        None => track.title.clone(),
    }
}

/// Derive a safe download filename from the playlist name.
fn playlist_filename(name: &str) -> String {
    let base: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}.m3u", if base.is_empty() { "playlist".to_string() } else { base })
}

/// Render the selection as an extended M3U playlist, in selection order.
/// Backslash path separators are rewritten to forward slashes so the file
/// is portable across players.
pub fn export_m3u(name: &str, tracks: &[Track]) -> Result<PlaylistExport, ExportError> {
    let mut lines = vec!["#EXTM3U".to_string()];
    let mut omitted = 0;

    for track in tracks {
        let Some(location) = track.file_location.as_deref() else {
            omitted += 1;
            continue;
        };
        lines.push(format!(
            "#EXTINF:{},{}",
            extinf_seconds(track.duration.as_deref()),
            extinf_label(track)
        ));
        lines.push(location.replace('\\', "/"));
    }

    if omitted == tracks.len() {
        return Err(ExportError::NoLocations(tracks.len()));
    }

    let mut content = lines.join("\n");
    content.push('\n');
    Ok(PlaylistExport {
        filename: playlist_filename(name),
        content,
        omitted,
    })
}
