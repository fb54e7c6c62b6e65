//! Word tables and pattern matchers backing synthetic answers and the
//! similarity engine's semantic tiers.

use std::sync::LazyLock;

use rand::seq::IndexedRandom;
use regex::Regex;

/// Answer vocabulary grouped by category keyword.
pub const CATEGORY_WORDS: &[(&str, &[&str])] = &[
    (
        "kahvaltilik",
        &["ekmek", "peynir", "zeytin", "yumurta", "bal", "simit", "çay"],
    ),
    ("icecek", &["su", "çay", "kahve", "ayran", "kola", "meşrubat"]),
    ("meyve", &["elma", "muz", "portakal", "çilek", "karpuz", "üzüm"]),
    ("sehir", &["istanbul", "ankara", "izmir", "bursa", "antalya"]),
    ("renk", &["mavi", "kırmızı", "yeşil", "sarı", "beyaz", "siyah"]),
    ("hayvan", &["kedi", "köpek", "kuş", "at", "balık", "aslan"]),
    ("film", &["komedi", "aksiyon", "drama", "korku", "bilimkurgu"]),
];

/// Direct synonym / strong-association table, looked up in both directions.
pub const SYNONYMS: &[(&str, &[&str])] = &[
    ("su", &["içecek", "ayran"]),
    ("ekmek", &["simit", "poğaça"]),
    ("kedi", &["hayvan", "pisi"]),
    ("köpek", &["hayvan", "can"]),
    ("mavi", &["lacivert", "gökyüzü"]),
];

/// Alternates that pair naturally with a film genre.
pub const FILM_SIMILAR: &[(&str, &[&str])] = &[
    ("komedi", &["drama", "aksiyon"]),
    ("aksiyon", &["macera", "gerilim"]),
    ("drama", &["komedi", "romantik"]),
    ("korku", &["gerilim", "aksiyon"]),
    ("bilimkurgu", &["fantastik", "aksiyon"]),
];

/// Last-resort answers that fit almost any everyday question.
pub const UNIVERSAL_ANSWERS: &[&str] = &["ekmek", "su", "elma", "istanbul", "kedi", "mavi"];

/// Canonical default answer per category.
pub const CATEGORY_DEFAULTS: &[(&str, &str)] = &[
    ("kahvaltilik", "ekmek"),
    ("icecek", "su"),
    ("meyve", "elma"),
    ("sehir", "istanbul"),
    ("renk", "mavi"),
    ("hayvan", "kedi"),
    ("film", "komedi"),
];

/// Categories whose vocabulary is a closed set: a validated remote answer
/// outside the whitelist is replaced by the category default.
pub const CLOSED_SET_CATEGORIES: &[&str] = &["icecek", "renk"];

/// Narrow keyword regexes for questions that never mention a category name
/// verbatim.
static BASIC_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)kahvaltı", "kahvaltilik"),
        (r"(?i)içecek", "icecek"),
        (r"(?i)meyve", "meyve"),
        (r"(?i)şehir|il", "sehir"),
        (r"(?i)renk", "renk"),
        (r"(?i)hayvan", "hayvan"),
        (r"(?i)film", "film"),
    ]
    .into_iter()
    .map(|(pattern, category)| {
        (
            Regex::new(pattern).expect("static keyword pattern is valid"),
            category,
        )
    })
    .collect()
});

/// Vocabulary of a category, when the category is known.
pub fn words_for(category: &str) -> Option<&'static [&'static str]> {
    CATEGORY_WORDS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, words)| *words)
}

/// Category a word belongs to, when it appears in any vocabulary.
pub fn word_category(word: &str) -> Option<&'static str> {
    CATEGORY_WORDS
        .iter()
        .find(|(_, words)| words.contains(&word))
        .map(|(name, _)| *name)
}

/// Whether one word is a registered synonym of the other, in either direction.
pub fn are_synonyms(a: &str, b: &str) -> bool {
    let listed = |word: &str, other: &str| {
        SYNONYMS
            .iter()
            .any(|(base, alts)| *base == word && alts.contains(&other))
    };
    listed(a, b) || listed(b, a)
}

/// Whether some category vocabulary contains both words. Checked against
/// every bucket because a word ("çay") can sit in several.
pub fn same_category(a: &str, b: &str) -> bool {
    CATEGORY_WORDS
        .iter()
        .any(|(_, words)| words.contains(&a) && words.contains(&b))
}

/// Canonical default answer for a category.
pub fn category_default(category: &str) -> Option<&'static str> {
    CATEGORY_DEFAULTS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, word)| *word)
}

/// Whether a category's vocabulary is a closed set.
pub fn is_closed_set(category: &str) -> bool {
    CLOSED_SET_CATEGORIES.contains(&category)
}

/// Advanced matcher: scan the question for a category keyword and pick a
/// random word from that category's vocabulary.
pub fn advanced_answer(question: &str) -> Option<&'static str> {
    let question = question.to_lowercase();
    CATEGORY_WORDS
        .iter()
        .find(|(category, _)| question.contains(category))
        .and_then(|(_, words)| words.choose(&mut rand::rng()).copied())
}

/// Basic matcher: match the question against the narrower keyword regexes.
pub fn basic_answer(question: &str) -> Option<&'static str> {
    BASIC_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(question))
        .and_then(|(_, category)| words_for(category))
        .and_then(|words| words.choose(&mut rand::rng()).copied())
}

/// Guaranteed fallback: random pick from the universal word list.
pub fn universal_answer() -> &'static str {
    UNIVERSAL_ANSWERS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or("su")
}

/// Near-synonym of a word, for the correlated half of a synthetic pair.
pub fn near_synonym(word: &str) -> Option<&'static str> {
    SYNONYMS
        .iter()
        .find(|(base, _)| *base == word)
        .and_then(|(_, alts)| alts.choose(&mut rand::rng()).copied())
}

/// Genre alternate of a film answer.
pub fn film_alternate(word: &str) -> Option<&'static str> {
    FILM_SIMILAR
        .iter()
        .find(|(base, _)| *base == word)
        .and_then(|(_, alts)| alts.choose(&mut rand::rng()).copied())
}

/// A different word from the same category vocabulary.
pub fn category_alternate(word: &str) -> Option<&'static str> {
    let words = words_for(word_category(word)?)?;
    let others: Vec<&'static str> = words.iter().copied().filter(|w| *w != word).collect();
    others.choose(&mut rand::rng()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_match_in_both_directions() {
        assert!(are_synonyms("su", "ayran"));
        assert!(are_synonyms("ayran", "su"));
        assert!(!are_synonyms("su", "kedi"));
    }

    #[test]
    fn category_lookup_covers_every_table_word() {
        // A word can sit in several vocabularies ("çay"); the lookup settles
        // on the first, but it must always resolve to one that contains it.
        for (_, words) in CATEGORY_WORDS {
            for word in *words {
                let category = word_category(word).expect(word);
                assert!(words_for(category).unwrap().contains(word));
            }
        }
    }

    #[test]
    fn shared_bucket_counts_as_same_category() {
        assert!(same_category("elma", "muz"));
        assert!(same_category("çay", "kahve"));
        assert!(!same_category("elma", "kedi"));
        assert!(!same_category("elma", "yok"));
    }

    #[test]
    fn advanced_matcher_stays_inside_its_category() {
        let answer = advanced_answer("en sevdiğin icecek nedir").unwrap();
        assert!(words_for("icecek").unwrap().contains(&answer));
    }

    #[test]
    fn basic_matcher_uses_keyword_regexes() {
        let answer = basic_answer("Kahvaltıda ne yersin?").unwrap();
        assert!(words_for("kahvaltilik").unwrap().contains(&answer));
        assert!(basic_answer("tamamen alakasız bir soru").is_none());
    }

    #[test]
    fn category_alternate_differs_from_base() {
        let alternate = category_alternate("kedi").unwrap();
        assert_ne!(alternate, "kedi");
        assert!(words_for("hayvan").unwrap().contains(&alternate));
    }

    #[test]
    fn every_category_has_a_default_inside_its_vocabulary() {
        for (category, default) in CATEGORY_DEFAULTS {
            assert!(words_for(category).unwrap().contains(default));
        }
    }
}
