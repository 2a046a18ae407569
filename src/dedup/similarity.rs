//! Title similarity score in `[0.0, 1.0]`.
//!
//! Cheap and deliberately coarse: exact match after casefold and trim,
//! then containment weighted by length, then Jaccard over the character
//! sets. Good enough to surface "same song, different labeling" pairs
//! for human review without an edit-distance pass over every pair.

use crate::normalize::normalize_for_search;
use std::collections::HashSet;

pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize_for_search(a);
    let b = normalize_for_search(b);

    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a.contains(&b) || b.contains(&a) {
        let (shorter, longer) = if a_len < b_len { (a_len, b_len) } else { (b_len, a_len) };
        return shorter as f64 / longer as f64;
    }

    let a_set: HashSet<char> = a.chars().collect();
    let b_set: HashSet<char> = b.chars().collect();
    let intersection = a_set.intersection(&b_set).count();
    let union = a_set.union(&b_set).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_after_casefold_and_trim_is_one() {
        assert_eq!(similarity("Sandstorm", "  sandstorm "), 1.0);
    }

    #[test]
    fn empty_side_is_zero() {
        assert_eq!(similarity("", "x"), 0.0);
        assert_eq!(similarity("   ", "x"), 0.0);
        // Equality is checked first, two empties are an exact match
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("  ", ""), 1.0);
    }

    #[test]
    fn decomposed_accents_compare_equal() {
        // e + combining acute vs precomposed é
        assert_eq!(similarity("Caf\u{e9} del Mar", "Cafe\u{0301} del mar"), 1.0);
    }

    #[test]
    fn containment_is_length_ratio() {
        assert_eq!(similarity("cat", "cats"), 0.75);
        // 9 of 17 characters
        let score = similarity("Yesterday", "yesterday (remix)");
        assert!((score - 9.0 / 17.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_shapes_fall_back_to_character_jaccard() {
        // {a,b,c} vs {b,c,d}: 2 shared of 4 total
        assert_eq!(similarity("abc", "bcd"), 0.5);
    }

    #[test]
    fn score_is_commutative() {
        for (a, b) in [("cat", "cats"), ("abc", "bcd"), ("Strobe", "Strobe Edit")] {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }
}
