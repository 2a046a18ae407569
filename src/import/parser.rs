//! Shared parsing entry point for DJ-software export files.
//!
//! Dispatches on file extension or a content sniff, then dedupes the
//! candidates by lowercased title before anything reaches the network
//! layer. This pre-upload dedupe is a deliberate single rule (first
//! occurrence wins, exact lowercase match) and is distinct from the
//! similarity-based duplicate review engine.

use super::rekordbox_xml::parse_rekordbox_xml;
use super::tab_delimited::parse_tab_delimited;
use crate::library_store::NewTrack;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Accept only real calendar dates shaped `YYYY-MM-DD`; anything else is
/// treated as absent.
pub(crate) fn validate_date(raw: Option<String>) -> Option<String> {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
    raw.filter(|value| {
        re.is_match(value) && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    AttributeXml,
    TabDelimited,
}

fn sniff_format(content: &str, filename: Option<&str>) -> ExportFormat {
    if let Some(name) = filename {
        if name.to_lowercase().ends_with(".xml") {
            return ExportFormat::AttributeXml;
        }
    }
    let head = content.trim_start();
    if head.starts_with("<?xml") || head.starts_with('<') {
        ExportFormat::AttributeXml
    } else {
        ExportFormat::TabDelimited
    }
}

/// Keep the first candidate per lowercased title, preserving order.
pub fn dedupe_by_title(candidates: Vec<NewTrack>) -> Vec<NewTrack> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.title.to_lowercase()))
        .collect()
}

/// Parse a raw export file into deduplicated track candidates.
pub fn parse_export(content: &str, filename: Option<&str>) -> Result<Vec<NewTrack>> {
    let candidates = match sniff_format(content, filename) {
        ExportFormat::AttributeXml => parse_rekordbox_xml(content)?,
        ExportFormat::TabDelimited => parse_tab_delimited(content),
    };
    Ok(dedupe_by_title(candidates))
}
