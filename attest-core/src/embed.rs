//! Pluggable embedding providers.
//!
//! The pipeline treats embedding as a pure, deterministic black box that maps
//! text to a unit-length vector of fixed dimension. Two providers are
//! available: a local hashed bag-of-words embedder (always available, also
//! the test double) and an OpenAI-compatible HTTP embedder.

use crate::config::EmbeddingConfig;
use crate::error::{CoreError, GenerationError};

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Generate a unit-normalized embedding for a single text.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// L2-normalize a vector in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Instantiate the embedder named by the configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>, CoreError> {
    match config.provider.as_str() {
        "hash" => Ok(Box::new(HashEmbedder::new(config.dimensions))),
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                CoreError::Generation(GenerationError::AuthFailed {
                    var: config.api_key_env.clone(),
                })
            })?;
            Ok(Box::new(OpenAiEmbedder::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
            )))
        }
        other => Err(CoreError::Config(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

/// Local hashed bag-of-words embedder. Deterministic for a fixed dimension:
/// each term is hashed to a dimension index, term frequency is accumulated,
/// and the vector is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

fn term_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty());

        for word in words {
            vector[term_hash(word) % self.dimensions] += 1.0;
        }

        l2_normalize(&mut vector);
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".into());
        let dims = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        // The Embedder trait is sync; bridge onto the ambient runtime.
        let rt = tokio::runtime::Handle::try_current();
        match rt {
            Ok(handle) => {
                let api_key = self.api_key.clone();
                let model = self.model.clone();
                let base_url = self.base_url.clone();
                let text = text.to_string();
                let client = self.client.clone();
                let dims = self.dims;

                std::thread::scope(|s| {
                    s.spawn(|| {
                        handle.block_on(async {
                            Self::embed_api_call(&client, &api_key, &model, &base_url, &text, dims)
                                .await
                        })
                    })
                    .join()
                    .unwrap_or_else(|_| vec![0.0; dims])
                })
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available for OpenAI embedding");
                vec![0.0; self.dims]
            }
        }
    }

    async fn embed_api_call(
        client: &reqwest::Client,
        api_key: &str,
        model: &str,
        base_url: &str,
        text: &str,
        dims: usize,
    ) -> Vec<f32> {
        let url = format!("{base_url}/v1/embeddings");
        let body = serde_json::json!({
            "model": model,
            "input": text,
        });

        match client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => {
                if let Ok(json) = resp.json::<serde_json::Value>().await
                    && let Some(embedding) = json["data"][0]["embedding"].as_array()
                {
                    let mut vector: Vec<f32> = embedding
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    l2_normalize(&mut vector);
                    return vector;
                }
                vec![0.0; dims]
            }
            Err(e) => {
                tracing::warn!("OpenAI embedding error: {}", e);
                vec![0.0; dims]
            }
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
