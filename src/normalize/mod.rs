//! Text normalization used by the import parsers and the duplicate engine.
//!
//! `normalize` is applied to every field before it is stored;
//! `normalize_for_search` is only ever used for comparisons.

use unicode_normalization::UnicodeNormalization;

/// Strip control characters, trim whitespace and collapse empty values to
/// `None`. Idempotent: `normalize(normalize(x)) == normalize(x)`.
///
/// All C0 controls are removed, including tab/newline/CR; stored fields
/// are single-line.
pub fn normalize(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Hebrew niqqud and cantillation marks (combining characters).
fn is_hebrew_mark(c: char) -> bool {
    ('\u{0591}'..='\u{05C7}').contains(&c)
}

/// Canonical composition, case folding and removal of Hebrew diacritical
/// marks. Used for comparison only, never for storage.
pub fn normalize_for_search(raw: &str) -> String {
    raw.nfc()
        .filter(|c| !is_hebrew_mark(*c))
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Format a track duration in whole seconds as `M:SS`.
pub fn format_duration(total_seconds: u64) -> String {
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_controls_and_trims() {
        assert_eq!(normalize(Some("  hello \u{0}world  ")), Some("hello world".to_string()));
        assert_eq!(normalize(Some("a\tb\nc")), Some("abc".to_string()));
    }

    #[test]
    fn normalize_empty_becomes_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some("")), None);
        assert_eq!(normalize(Some("   ")), None);
        assert_eq!(normalize(Some("\u{0}\u{1}")), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["  Song Title ", "\u{0}x", "abc", " \t "] {
            let once = normalize(Some(raw));
            let twice = normalize(once.as_deref());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn search_normalization_case_folds_and_composes() {
        assert_eq!(normalize_for_search("HeLLo"), "hello");
        // e + combining acute composes to é
        assert_eq!(normalize_for_search("Cafe\u{0301}"), "caf\u{e9}");
    }

    #[test]
    fn search_normalization_strips_niqqud() {
        // "שָׁלוֹם" with vowel points reduces to the bare consonants
        assert_eq!(
            normalize_for_search("\u{5e9}\u{5b8}\u{5c1}\u{5dc}\u{5d5}\u{5b9}\u{5dd}"),
            "\u{5e9}\u{5dc}\u{5d5}\u{5dd}"
        );
    }

    #[test]
    fn duration_formatting_zero_pads_seconds() {
        assert_eq!(format_duration(61), "1:01");
        assert_eq!(format_duration(600), "10:00");
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(59), "0:59");
        assert_eq!(format_duration(3601), "60:01");
    }
}
