//! Tab-delimited export parser (Rekordbox "export collection as txt").
//!
//! Row 0 is a header and is discarded; fields are positional. Rows with an
//! empty title are skipped, malformed rows are dropped rather than fatal.

use super::parser::validate_date;
use crate::library_store::NewTrack;
use crate::normalize::normalize;

const COL_TITLE: usize = 2;
const COL_ARTIST: usize = 3;
const COL_ALBUM: usize = 4;
const COL_BPM: usize = 5;
const COL_KEY: usize = 6;
const COL_DURATION: usize = 7;
const COL_GENRE: usize = 8;
const COL_RATING: usize = 9;
const COL_DATE_ADDED: usize = 10;

fn field(fields: &[&str], index: usize) -> Option<String> {
    normalize(fields.get(index).copied())
}

fn parse_positive_f64(raw: Option<String>) -> Option<f64> {
    let value: f64 = raw?.parse().ok()?;
    if value > 0.0 {
        Some(value)
    } else {
        None
    }
}

fn parse_rating(raw: Option<String>) -> Option<i64> {
    let value: i64 = raw?.parse().ok()?;
    if value > 0 {
        Some(value)
    } else {
        None
    }
}

pub fn parse_tab_delimited(content: &str) -> Vec<NewTrack> {
    content
        .lines()
        .skip(1) // header row
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            let title = field(&fields, COL_TITLE)?;
            Some(NewTrack {
                title,
                artist: field(&fields, COL_ARTIST),
                album: field(&fields, COL_ALBUM),
                bpm: parse_positive_f64(field(&fields, COL_BPM)),
                musical_key: field(&fields, COL_KEY),
                duration: field(&fields, COL_DURATION),
                genre: field(&fields, COL_GENRE),
                rating: parse_rating(field(&fields, COL_RATING)),
                date_added: validate_date(field(&fields, COL_DATE_ADDED)),
                external_id: None,
                file_location: None,
            })
        })
        .collect()
}
