//! Attribute-block XML export parser (Rekordbox collection dumps).
//!
//! Each `<TRACK .../>` element carries its fields as attributes. A block
//! without a usable Name is skipped; so are short WAV samples, which are
//! cue noise rather than songs. Individual malformed blocks never fail
//! the parse.

use super::parser::validate_date;
use crate::library_store::NewTrack;
use crate::normalize::{format_duration, normalize};
use anyhow::{Context, Result};
use roxmltree::Document;

/// Samples below this length (in seconds) with a waveform-file kind are
/// dropped as noise.
const MIN_SAMPLE_SECONDS: f64 = 30.0;

fn parse_positive_f64(raw: Option<&str>) -> Option<f64> {
    let value: f64 = raw?.trim().parse().ok()?;
    if value > 0.0 {
        Some(value)
    } else {
        None
    }
}

fn parse_rating(raw: Option<&str>) -> Option<i64> {
    let value: i64 = raw?.trim().parse().ok()?;
    if value > 0 {
        Some(value)
    } else {
        None
    }
}

/// Percent-decode a Location attribute and strip the `file://localhost/`
/// prefix. A decode failure keeps the raw value rather than failing the
/// block.
pub(crate) fn decode_location(raw: &str) -> String {
    let decoded = match urlencoding::decode(raw) {
        Ok(cow) => cow.into_owned(),
        Err(_) => raw.to_string(),
    };
    decoded
        .strip_prefix("file://localhost")
        .unwrap_or(&decoded)
        .to_string()
}

pub fn parse_rekordbox_xml(content: &str) -> Result<Vec<NewTrack>> {
    let doc = Document::parse(content).context("Not a well-formed XML export")?;

    let mut tracks = Vec::new();
    for node in doc.descendants().filter(|n| n.has_tag_name("TRACK")) {
        let title = match normalize(node.attribute("Name")) {
            Some(title) => title,
            None => continue,
        };

        let total_time = parse_positive_f64(node.attribute("TotalTime"));

        // Noise filter: short generic waveform files are cue samples
        if let (Some(kind), Some(secs)) = (node.attribute("Kind"), total_time) {
            if kind.to_lowercase().contains("wav") && secs < MIN_SAMPLE_SECONDS {
                continue;
            }
        }

        let file_location = normalize(node.attribute("Location"))
            .map(|raw| decode_location(&raw));

        tracks.push(NewTrack {
            title,
            artist: normalize(node.attribute("Artist")),
            album: normalize(node.attribute("Album")),
            bpm: parse_positive_f64(node.attribute("AverageBpm")),
            musical_key: normalize(node.attribute("Tonality")),
            duration: total_time.map(|secs| format_duration(secs as u64)),
            genre: normalize(node.attribute("Genre")),
            rating: parse_rating(node.attribute("Rating")),
            date_added: validate_date(normalize(node.attribute("DateAdded"))),
            external_id: normalize(node.attribute("TrackID")),
            file_location,
        });
    }
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(tracks: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <DJ_PLAYLISTS Version=\"1.0.0\"><COLLECTION>{}</COLLECTION></DJ_PLAYLISTS>",
            tracks
        )
    }

    #[test]
    fn parses_all_attributes() {
        let xml = collection(
            "<TRACK TrackID=\"42\" Name=\"Levels\" Artist=\"Avicii\" Album=\"True\" \
             AverageBpm=\"126.00\" Tonality=\"11B\" TotalTime=\"201\" Genre=\"House\" \
             Rating=\"4\" DateAdded=\"2023-08-01\" Kind=\"MP3 File\" \
             Location=\"file://localhost/Users/dj/Music/Levels%20Mix.mp3\"/>",
        );
        let tracks = parse_rekordbox_xml(&xml).unwrap();
        assert_eq!(tracks.len(), 1);
        let t = &tracks[0];
        assert_eq!(t.title, "Levels");
        assert_eq!(t.artist.as_deref(), Some("Avicii"));
        assert_eq!(t.album.as_deref(), Some("True"));
        assert_eq!(t.bpm, Some(126.0));
        assert_eq!(t.musical_key.as_deref(), Some("11B"));
        assert_eq!(t.duration.as_deref(), Some("3:21"));
        assert_eq!(t.genre.as_deref(), Some("House"));
        assert_eq!(t.rating, Some(4));
        assert_eq!(t.date_added.as_deref(), Some("2023-08-01"));
        assert_eq!(t.external_id.as_deref(), Some("42"));
        assert_eq!(t.file_location.as_deref(), Some("/Users/dj/Music/Levels Mix.mp3"));
    }

    #[test]
    fn block_without_name_is_skipped() {
        let xml = collection(
            "<TRACK Artist=\"Nameless\"/>\
             <TRACK Name=\"   \" Artist=\"Blank\"/>\
             <TRACK Name=\"Kept\"/>",
        );
        let tracks = parse_rekordbox_xml(&xml).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Kept");
    }

    #[test]
    fn non_positive_bpm_and_rating_become_null() {
        let xml = collection(
            "<TRACK Name=\"A\" AverageBpm=\"0.00\" Rating=\"0\"/>\
             <TRACK Name=\"B\" AverageBpm=\"-1\" Rating=\"-3\"/>\
             <TRACK Name=\"C\" AverageBpm=\"garbage\" Rating=\"five\"/>",
        );
        let tracks = parse_rekordbox_xml(&xml).unwrap();
        assert_eq!(tracks.len(), 3);
        for t in &tracks {
            assert_eq!(t.bpm, None);
            assert_eq!(t.rating, None);
        }
    }

    #[test]
    fn short_wav_samples_are_dropped() {
        let xml = collection(
            "<TRACK Name=\"Airhorn\" Kind=\"WAV File\" TotalTime=\"3\"/>\
             <TRACK Name=\"Long Wav\" Kind=\"WAV File\" TotalTime=\"240\"/>\
             <TRACK Name=\"Short Mp3\" Kind=\"MP3 File\" TotalTime=\"3\"/>",
        );
        let tracks = parse_rekordbox_xml(&xml).unwrap();
        let titles: Vec<_> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Long Wav", "Short Mp3"]);
    }

    #[test]
    fn malformed_date_is_treated_as_absent() {
        let xml = collection("<TRACK Name=\"A\" DateAdded=\"01/02/2023\"/>");
        let tracks = parse_rekordbox_xml(&xml).unwrap();
        assert_eq!(tracks[0].date_added, None);
    }

    #[test]
    fn undecodable_location_keeps_raw_value() {
        // Truncated percent escape is not valid UTF-8 after decoding
        let raw = "file://localhost/Music/bad%FF%FEname.mp3";
        let decoded = decode_location(raw);
        assert!(decoded.contains("bad") || decoded == raw);

        let plain = decode_location("C:/Music/plain.mp3");
        assert_eq!(plain, "C:/Music/plain.mp3");
    }

    #[test]
    fn whole_document_must_be_well_formed() {
        assert!(parse_rekordbox_xml("<TRACK Name=\"unterminated").is_err());
    }
}
