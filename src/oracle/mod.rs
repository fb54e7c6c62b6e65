//! Answer oracle for synthetic players: a remote generator under a strict
//! single-word contract, backed by deterministic pattern matchers so an
//! answer is always produced.

pub mod patterns;
pub mod remote;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

pub use remote::{GenerateText, GeneratorError, HttpTextGenerator};

/// Validated answers shorter than this are rejected as noise.
const MIN_ANSWER_CHARS: usize = 2;

/// Trailing grammatical suffixes the single-word contract forbids; stripped
/// defensively because generators add them anyway.
static TRAILING_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(dir|dır|tir|tır|dur|dür|tur|tür)$").expect("static suffix pattern is valid")
});

/// Punctuation stripped from generated answers.
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.,!?;:()'"\-_*]"#).expect("static punctuation pattern is valid"));

/// Produces single-word answers for synthetic players.
///
/// The remote generator is optional and unreliable; the fallback chain
/// guarantees a non-empty lowercase token for any input.
#[derive(Clone)]
pub struct AnswerOracle {
    generator: Option<Arc<dyn GenerateText>>,
}

impl AnswerOracle {
    /// Build an oracle over an optional remote generator.
    pub fn new(generator: Option<Arc<dyn GenerateText>>) -> Self {
        Self { generator }
    }

    /// Oracle without a remote generator; answers come from the pattern chain.
    pub fn offline() -> Self {
        Self::new(None)
    }

    /// Oracle wired to the environment-configured generator, when present.
    pub fn from_env() -> Self {
        Self::new(
            HttpTextGenerator::from_env()
                .map(|generator| Arc::new(generator) as Arc<dyn GenerateText>),
        )
    }

    /// Produce a single-word answer for a question; never fails.
    pub async fn answer(&self, question: &str, category: Option<&str>) -> String {
        if let Some(generator) = &self.generator {
            let prompt = build_prompt(question, category);
            match generator.generate(prompt).await {
                Ok(raw) => {
                    if let Some(validated) = validate(&raw) {
                        return apply_closed_set(validated, category);
                    }
                    debug!(question, "generated answer failed validation; falling back");
                }
                Err(err) => {
                    debug!(question, error = %err, "generator unavailable; falling back");
                }
            }
        }
        fallback(question, category)
    }

    /// Produce an intentionally correlated answer pair for two synthetic
    /// teammates, so synthetic teams score non-trivially without a second
    /// remote call.
    pub async fn paired_answers(&self, question: &str, category: Option<&str>) -> (String, String) {
        let base = self.answer(question, category).await;
        let similar = derive_similar(&base);
        (base, similar)
    }
}

/// Single-word-only instruction prompt: no sentences, no punctuation, no
/// grammatical suffixes, bare form, with the question and optional category
/// embedded.
fn build_prompt(question: &str, category: Option<&str>) -> String {
    let mut prompt = String::from(
        "SADECE TEK KELİME YAZ. Cümle kurmak, açıklama yapmak, noktalama \
         işareti ve -dir/-dır ekleri yasak. Kelimenin yalın halini kullan.\n",
    );
    if let Some(category) = category {
        prompt.push_str(&format!("KATEGORİ: {category}\n"));
    }
    prompt.push_str(&format!("SORU: {question}\nCEVAP:"));
    prompt
}

/// Collapse a raw generation to a usable lowercase token, or reject it.
fn validate(raw: &str) -> Option<String> {
    let first_token = raw.trim().split_whitespace().next()?;
    let lowered = first_token.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let stripped = TRAILING_SUFFIX.replace(&stripped, "");
    let cleaned = stripped.trim().to_string();
    if cleaned.chars().count() < MIN_ANSWER_CHARS {
        return None;
    }
    Some(cleaned)
}

/// For closed-set categories, replace out-of-set answers with the category's
/// canonical default.
fn apply_closed_set(answer: String, category: Option<&str>) -> String {
    let Some(category) = category else {
        return answer;
    };
    if !patterns::is_closed_set(category) {
        return answer;
    }
    let in_set = patterns::words_for(category)
        .map(|words| words.contains(&answer.as_str()))
        .unwrap_or(true);
    if in_set {
        answer
    } else {
        patterns::category_default(category)
            .map(str::to_string)
            .unwrap_or(answer)
    }
}

/// Deterministic answer chain: category vocabulary, advanced keyword match,
/// basic regex match, universal word list. Always yields a word.
fn fallback(question: &str, category: Option<&str>) -> String {
    if let Some(words) = category.and_then(patterns::words_for) {
        use rand::seq::IndexedRandom;
        if let Some(word) = words.choose(&mut rand::rng()) {
            return (*word).to_string();
        }
    }
    patterns::advanced_answer(question)
        .or_else(|| patterns::basic_answer(question))
        .unwrap_or_else(patterns::universal_answer)
        .to_string()
}

/// Derive a "similar" answer for the second bot of a pair: near-synonyms,
/// then genre alternates, then another word of the same category, and as a
/// last resort the base answer verbatim.
fn derive_similar(base: &str) -> String {
    patterns::near_synonym(base)
        .or_else(|| patterns::film_alternate(base))
        .or_else(|| patterns::category_alternate(base))
        .map(str::to_string)
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::similarity;

    struct FixedGenerator(&'static str);

    impl GenerateText for FixedGenerator {
        fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GeneratorError>> {
            let output = self.0.to_string();
            Box::pin(async move { Ok(output) })
        }
    }

    struct FailingGenerator;

    impl GenerateText for FailingGenerator {
        fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GeneratorError>> {
            Box::pin(async move { Err(GeneratorError::Malformed) })
        }
    }

    fn assert_valid_token(answer: &str) {
        assert!(!answer.is_empty());
        assert!(!answer.contains(char::is_whitespace));
        assert_eq!(answer, answer.to_lowercase());
    }

    #[test]
    fn validation_collapses_to_a_bare_lowercase_token() {
        assert_eq!(validate("  Buzdolabı.  "), Some("buzdolabı".into()));
        assert_eq!(validate("EKMEKTIR"), Some("ekmek".into()));
        assert_eq!(validate("su içmek lazım"), Some("su".into()));
    }

    #[test]
    fn validation_rejects_noise() {
        assert_eq!(validate(""), None);
        assert_eq!(validate("   "), None);
        assert_eq!(validate("a"), None);
        assert_eq!(validate("?!"), None);
    }

    #[test]
    fn prompt_embeds_question_and_category() {
        let prompt = build_prompt("En sevilen içecek nedir?", Some("icecek"));
        assert!(prompt.contains("SORU: En sevilen içecek nedir?"));
        assert!(prompt.contains("KATEGORİ: icecek"));
        assert!(prompt.contains("TEK KELİME"));
    }

    #[tokio::test]
    async fn answer_is_total_for_any_input_and_remote_outcome() {
        let oracles = [
            AnswerOracle::offline(),
            AnswerOracle::new(Some(Arc::new(FailingGenerator))),
            AnswerOracle::new(Some(Arc::new(FixedGenerator("")))),
            AnswerOracle::new(Some(Arc::new(FixedGenerator("Bu bir cümledir.")))),
            AnswerOracle::new(Some(Arc::new(FixedGenerator("ayran")))),
        ];
        let questions = ["", "???", "En sevilen içecek nedir?", "garip soru"];
        for oracle in &oracles {
            for question in questions {
                for category in [None, Some("icecek"), Some("yok-boyle-kategori")] {
                    let answer = oracle.answer(question, category).await;
                    assert_valid_token(&answer);
                }
            }
        }
    }

    #[tokio::test]
    async fn closed_set_category_overrides_foreign_answers() {
        let oracle = AnswerOracle::new(Some(Arc::new(FixedGenerator("otomobil"))));
        let answer = oracle.answer("En sevilen içecek nedir?", Some("icecek")).await;
        assert_eq!(answer, "su");
    }

    #[tokio::test]
    async fn closed_set_category_keeps_in_set_answers() {
        let oracle = AnswerOracle::new(Some(Arc::new(FixedGenerator("ayran"))));
        let answer = oracle.answer("En sevilen içecek nedir?", Some("icecek")).await;
        assert_eq!(answer, "ayran");
    }

    #[tokio::test]
    async fn paired_answers_are_correlated() {
        let oracle = AnswerOracle::offline();
        let (base, similar) = oracle
            .paired_answers("En sevilen içecek nedir?", Some("icecek"))
            .await;
        assert_valid_token(&base);
        assert_valid_token(&similar);
        assert!(
            similarity::score(&base, &similar) > 0.0,
            "pair {base}/{similar} should score"
        );
    }
}
