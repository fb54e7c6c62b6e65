//! Application-level configuration loading, including the shared-guess
//! question pool.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use rand::seq::IndexedRandom;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dao::models::{AnswerKind, QuestionEntity, RoundKind};

/// Default location on disk where the library looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COMMON_MIND_CONFIG_PATH";
/// Answer window baked into default questions.
const DEFAULT_TIME_LIMIT_SECS: u32 = 20;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the session core.
pub struct AppConfig {
    questions: Vec<QuestionEntity>,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the baked-in
    /// question pool.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        count = config.questions.len(),
                        "loaded question pool from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Build a configuration from an explicit pool, mostly for tests.
    pub fn with_questions(questions: Vec<QuestionEntity>) -> Self {
        Self { questions }
    }

    /// Pick one random question tagged for the given round kind.
    pub fn pick_question(&self, round_kind: RoundKind) -> Option<QuestionEntity> {
        let tagged: Vec<&QuestionEntity> = self
            .questions
            .iter()
            .filter(|question| question.round_kind == round_kind)
            .collect();
        tagged.choose(&mut rand::rng()).map(|question| (*question).clone())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            questions: default_questions(),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single question inside the configuration file.
struct RawQuestion {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    time_limit_secs: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let questions = value.questions.into_iter().map(Into::into).collect();
        Self { questions }
    }
}

impl From<RawQuestion> for QuestionEntity {
    fn from(value: RawQuestion) -> Self {
        Self {
            id: value
                .id
                .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
            text: value.text,
            category: value.category,
            answer_kind: AnswerKind::FreeText,
            round_kind: RoundKind::SharedGuess,
            time_limit_secs: value.time_limit_secs.unwrap_or(DEFAULT_TIME_LIMIT_SECS),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn question(id: &str, text: &str, category: &str) -> QuestionEntity {
    QuestionEntity {
        id: id.into(),
        text: text.into(),
        category: Some(category.into()),
        answer_kind: AnswerKind::FreeText,
        round_kind: RoundKind::SharedGuess,
        time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
    }
}

/// Built-in question pool shipped with the library.
fn default_questions() -> Vec<QuestionEntity> {
    vec![
        question(
            "q-kahvalti",
            "Kahvaltıda ilk akla gelen yiyecek nedir?",
            "kahvaltilik",
        ),
        question("q-icecek", "En sevilen içecek nedir?", "icecek"),
        question("q-meyve", "Yaz deyince akla gelen meyve hangisi?", "meyve"),
        question("q-sehir", "Türkiye'nin en bilinen şehri hangisi?", "sehir"),
        question("q-renk", "Gökyüzü deyince akla gelen renk nedir?", "renk"),
        question("q-hayvan", "En sevimli evcil hayvan hangisi?", "hayvan"),
        question("q-film", "Akşam izlenecek film türü hangisi olsun?", "film"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_only_contains_shared_guess_questions() {
        let config = AppConfig::default();
        let question = config.pick_question(RoundKind::SharedGuess).unwrap();
        assert_eq!(question.round_kind, RoundKind::SharedGuess);
        assert!(question.category.is_some());
    }

    #[test]
    fn raw_questions_get_ids_and_defaults() {
        let raw = RawQuestion {
            id: None,
            text: "Soru?".into(),
            category: None,
            time_limit_secs: None,
        };
        let question: QuestionEntity = raw.into();
        assert!(!question.id.is_empty());
        assert_eq!(question.time_limit_secs, DEFAULT_TIME_LIMIT_SECS);
        assert_eq!(question.answer_kind, AnswerKind::FreeText);
    }
}
