//! Fuzzy closeness scoring between two free-text answers.
//!
//! Semantic tiers (synonym, shared category) deliberately outrank shallow
//! character similarity so coincidental string overlap between unrelated
//! words never beats a real association.

use crate::oracle::patterns;

/// Score for a registered synonym pair.
const SYNONYM_SCORE: f64 = 0.8;
/// Score for two different words of the same category.
const CATEGORY_SCORE: f64 = 0.5;
/// Score when one answer contains the other.
const CONTAINMENT_SCORE: f64 = 0.3;
/// Edit distance is only consulted for answers at most this long.
const EDIT_DISTANCE_MAX_LEN: usize = 8;
/// Minimum edit-distance ratio worth reporting at all.
const EDIT_DISTANCE_FLOOR: f64 = 0.6;
/// Scale applied to accepted edit-distance ratios, keeping them below the
/// synonym and category tiers.
const EDIT_DISTANCE_SCALE: f64 = 0.4;

/// Normalized closeness of two answers, in `[0, 1]`. First matching rule wins.
pub fn score(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if patterns::are_synonyms(&a, &b) {
        return SYNONYM_SCORE;
    }
    if patterns::same_category(&a, &b) {
        return CATEGORY_SCORE;
    }
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        return CONTAINMENT_SCORE;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    if len_a <= EDIT_DISTANCE_MAX_LEN && len_b <= EDIT_DISTANCE_MAX_LEN {
        let max_len = len_a.max(len_b);
        let distance = edit_distance(&a, &b);
        let ratio = (max_len - distance) as f64 / max_len as f64;
        if ratio > EDIT_DISTANCE_FLOOR {
            return ratio * EDIT_DISTANCE_SCALE;
        }
    }

    0.0
}

fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Classic single-character-edit (Levenshtein) distance over scalar values.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_answers_score_one() {
        assert_eq!(score("ekmek", "ekmek"), 1.0);
        assert_eq!(score("  Ekmek ", "ekmek"), 1.0);
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(score("", "ekmek"), 0.0);
        assert_eq!(score("ekmek", "   "), 0.0);
        assert_eq!(score("", ""), 0.0);
    }

    #[test]
    fn scoring_is_symmetric() {
        let pairs = [
            ("su", "ayran"),
            ("kedi", "keli"),
            ("elma", "muz"),
            ("istanbul", "istanbullu"),
            ("mavi", "lacivert"),
        ];
        for (a, b) in pairs {
            assert_eq!(score(a, b), score(b, a), "pair {a}/{b}");
        }
    }

    #[test]
    fn synonym_pair_scores_high() {
        assert_eq!(score("su", "ayran"), SYNONYM_SCORE);
        assert_eq!(score("mavi", "lacivert"), SYNONYM_SCORE);
    }

    #[test]
    fn same_category_scores_medium() {
        assert_eq!(score("elma", "muz"), CATEGORY_SCORE);
        assert_eq!(score("istanbul", "ankara"), CATEGORY_SCORE);
    }

    #[test]
    fn containment_beats_edit_distance() {
        assert_eq!(score("istanbul", "istanbullu"), CONTAINMENT_SCORE);
    }

    #[test]
    fn close_edit_distance_is_scaled_down() {
        // "kedi" vs "keli": one substitution over four characters.
        let value = score("kedi", "keli");
        assert!((value - 0.3).abs() < 1e-9);
        assert!(value <= EDIT_DISTANCE_SCALE);
    }

    #[test]
    fn semantic_match_outranks_character_similarity() {
        assert!(score("su", "ayran") >= CATEGORY_SCORE);
        assert!(score("kedi", "keli") <= EDIT_DISTANCE_SCALE);
        assert!(score("su", "ayran") > score("kedi", "keli"));
    }

    #[test]
    fn weak_edit_distance_ratio_scores_zero() {
        // Distance 3 over length 4 leaves a ratio of 0.25, under the floor.
        assert_eq!(score("abcd", "axyz"), 0.0);
    }

    #[test]
    fn long_unrelated_answers_score_zero() {
        assert_eq!(score("kahvaltıda yumurta", "sinemada patlamış mısır"), 0.0);
    }

    #[test]
    fn edit_distance_matches_known_values() {
        assert_eq!(edit_distance("kedi", "keli"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
    }
}
