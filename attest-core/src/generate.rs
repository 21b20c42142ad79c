//! Generation providers.
//!
//! The pipeline treats generation as a blocking, non-retried external
//! collaborator returning raw text; schema validation of that text happens
//! downstream in [`crate::schema::parse_model_output`]. Only transport
//! failures surface as errors here.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Instant;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

/// Raw generation result plus transport metrics.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_in: usize,
    pub tokens_out: usize,
    pub latency_ms: u64,
}

/// Trait for generation providers.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a JSON-mode completion for the prompt.
    async fn generate_json(&self, prompt: &str) -> Result<GenerationResponse, GenerationError>;

    /// Return the model identifier.
    fn model_id(&self) -> &str;
}

/// OpenAI-compatible chat-completions generator (Groq, OpenAI, Ollama, vLLM).
#[derive(Debug)]
pub struct OpenAiCompatGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    temperature: f64,
    max_tokens: usize,
}

impl OpenAiCompatGenerator {
    /// Create a generator from configuration, reading the API key from the
    /// environment variable named in `config.api_key_env`.
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| GenerationError::AuthFailed {
                var: config.api_key_env.clone(),
            })?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key,
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn estimate_tokens(text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    async fn generate_json(&self, prompt: &str) -> Result<GenerationResponse, GenerationError> {
        let start = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model_id,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [{ "role": "user", "content": prompt }],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::ApiRequest {
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(GenerationError::ApiRequest {
                message: format!("HTTP {status}: {detail}"),
            });
        }

        let value: serde_json::Value =
            resp.json().await.map_err(|e| GenerationError::ResponseParse {
                message: e.to_string(),
            })?;
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| GenerationError::ResponseParse {
                message: "missing choices[0].message.content".into(),
            })?
            .to_string();
        let tokens_out = value["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize;

        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(model = %self.model_id, tokens_out, latency_ms, "generation complete");

        Ok(GenerationResponse {
            text,
            tokens_in: Self::estimate_tokens(prompt),
            tokens_out,
            latency_ms,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(OpenAiCompatGenerator::estimate_tokens("one two three"), 3);
        assert_eq!(OpenAiCompatGenerator::estimate_tokens(""), 1);
    }

    #[test]
    fn test_missing_api_key_env_fails() {
        let config = GenerationConfig {
            api_key_env: "ATTEST_TEST_KEY_THAT_DOES_NOT_EXIST".into(),
            ..Default::default()
        };
        let err = OpenAiCompatGenerator::new(&config).unwrap_err();
        assert!(matches!(err, GenerationError::AuthFailed { .. }));
    }
}
