//! Configuration for Attest.
//!
//! Uses `figment` for layered configuration: defaults -> `attest.toml` in the
//! workspace -> `ATTEST_`-prefixed environment variables. The resulting
//! [`Settings`] value is immutable and passed into each component's
//! constructor; algorithmic code never reads the process environment.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::retrieval::fusion::TieBreaker;
use crate::retrieval::vector::VectorBackend;

/// Top-level configuration for the Attest pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub generation: GenerationConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub paths: PathsConfig,
}

/// Configuration for the generation provider (OpenAI-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier sent to the provider.
    pub model_id: String,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: usize,
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: "llama-3.1-8b-instant".into(),
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key_env: "GROQ_API_KEY".into(),
            max_tokens: 512,
            temperature: 0.2,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "hash" (local, deterministic) or "openai".
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Embedding dimensionality (used by the hash provider).
    pub dimensions: usize,
    /// Base URL for HTTP providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".into(),
            model: None,
            dimensions: 256,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".into(),
        }
    }
}

/// Configuration for retrieval and grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of candidates returned per query.
    pub k: usize,
    /// Support-score threshold below which an answer is refused.
    pub tau: f64,
    /// BM25 term-frequency saturation constant.
    pub k1: f32,
    /// BM25 length-normalization constant.
    pub b: f32,
    /// Vector search backend, fixed at construction time.
    pub vector_backend: VectorBackend,
    /// Score axis used to order fused candidates.
    pub tie_breaker: TieBreaker,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 4,
            tau: 0.4,
            k1: 1.5,
            b: 0.75,
            vector_backend: VectorBackend::Flat,
            tie_breaker: TieBreaker::Vector,
        }
    }
}

/// Filesystem locations for the corpus, index, and evaluation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub corpus_dir: PathBuf,
    pub index_dir: PathBuf,
    pub devset: PathBuf,
    pub safety_set: PathBuf,
    pub experiments_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("data/corpus"),
            index_dir: PathBuf::from("indexes"),
            devset: PathBuf::from("data/devset.jsonl"),
            safety_set: PathBuf::from("data/safety_prompts.jsonl"),
            experiments_log: PathBuf::from("logs/experiments.csv"),
        }
    }
}

/// Load settings with layered precedence (highest wins):
///
/// 1. `ATTEST_`-prefixed environment variables (`ATTEST_RETRIEVAL__TAU`, ...)
/// 2. `<workspace>/attest.toml`
/// 3. Built-in defaults
pub fn load_settings(workspace: Option<&Path>) -> Result<Settings, CoreError> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join("attest.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("ATTEST_").split("__"));

    figment
        .extract()
        .map_err(|e| CoreError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.retrieval.k, 4);
        assert!((s.retrieval.tau - 0.4).abs() < f64::EPSILON);
        assert!((s.retrieval.k1 - 1.5).abs() < f32::EPSILON);
        assert!((s.retrieval.b - 0.75).abs() < f32::EPSILON);
        assert_eq!(s.embedding.provider, "hash");
        assert_eq!(s.generation.max_tokens, 512);
    }

    #[test]
    fn test_settings_roundtrip() {
        let s = Settings::default();
        let json = serde_json::to_string(&s).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.retrieval.k, s.retrieval.k);
        assert_eq!(restored.paths.index_dir, s.paths.index_dir);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("attest.toml"),
            "[retrieval]\nk = 8\ntau = 0.25\n",
        )
        .unwrap();
        let s = load_settings(Some(dir.path())).unwrap();
        assert_eq!(s.retrieval.k, 8);
        assert!((s.retrieval.tau - 0.25).abs() < f64::EPSILON);
        // Untouched sections keep defaults
        assert_eq!(s.generation.max_tokens, 512);
    }
}
