//! Client for the remote text-generation endpoint, treated as an unreliable
//! oracle: every failure is soft and recovered by the caller's fallback chain.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::timeout;

/// Environment variable holding the generation endpoint URL.
const GENERATOR_URL_ENV: &str = "GENERATOR_URL";
/// Environment variable holding the optional bearer token.
const GENERATOR_TOKEN_ENV: &str = "GENERATOR_API_TOKEN";
/// Time allowed for one generation round-trip.
const GENERATION_TIMEOUT: Duration = Duration::from_secs(4);

/// Failures of a single generation attempt.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Request could not be sent or the endpoint answered with an error.
    #[error("generator request failed")]
    Transport(#[source] reqwest::Error),
    /// Response decoded, but no generated text could be extracted.
    #[error("generator returned an unusable payload")]
    Malformed,
    /// The endpoint did not answer in time.
    #[error("generator timed out")]
    Timeout,
}

/// Seam for the remote text generator so tests can substitute fakes.
pub trait GenerateText: Send + Sync {
    /// Produce raw generated text for a prompt.
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, GeneratorError>>;
}

/// HTTP-backed generator speaking the hosted inference endpoint's dialect.
#[derive(Clone)]
pub struct HttpTextGenerator {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpTextGenerator {
    /// Build a generator from an explicit endpoint.
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_token,
        }
    }

    /// Build a generator from the environment; `None` when no endpoint is
    /// configured, in which case callers skip straight to their fallbacks.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var(GENERATOR_URL_ENV).ok()?;
        if endpoint.trim().is_empty() {
            return None;
        }
        let api_token = std::env::var(GENERATOR_TOKEN_ENV).ok();
        Some(Self::new(endpoint, api_token))
    }

    async fn request(&self, prompt: String) -> Result<String, GeneratorError> {
        let mut builder = self.client.post(&self.endpoint).json(&json!({
            "inputs": prompt,
        }));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(GeneratorError::Transport)?;

        let payload = response
            .json::<Value>()
            .await
            .map_err(GeneratorError::Transport)?;
        extract_generated_text(&payload).ok_or(GeneratorError::Malformed)
    }
}

/// The endpoint answers either `[{"generated_text": ...}]` or
/// `{"generated_text": ...}` depending on deployment; accept both.
fn extract_generated_text(payload: &Value) -> Option<String> {
    let object = match payload {
        Value::Array(entries) => entries.first()?,
        other => other,
    };
    let text = object.get("generated_text")?.as_str()?;
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

impl GenerateText for HttpTextGenerator {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, GeneratorError>> {
        let generator = self.clone();
        Box::pin(async move {
            match timeout(GENERATION_TIMEOUT, generator.request(prompt)).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_from_array_shape() {
        let payload = json!([{ "generated_text": "ekmek" }]);
        assert_eq!(extract_generated_text(&payload).as_deref(), Some("ekmek"));
    }

    #[test]
    fn extracts_text_from_object_shape() {
        let payload = json!({ "generated_text": "su" });
        assert_eq!(extract_generated_text(&payload).as_deref(), Some("su"));
    }

    #[test]
    fn rejects_empty_and_malformed_payloads() {
        for payload in [
            json!([]),
            json!({}),
            json!({ "generated_text": "   " }),
            json!({ "generated_text": 42 }),
            json!("bare string"),
        ] {
            assert!(extract_generated_text(&payload).is_none());
        }
    }
}
