//! Error types for the Attest core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the index, configuration, and generation domains.
//!
//! Malformed model output is deliberately *not* an error: the grounding
//! verifier consumes it as a zero-support outcome and substitutes the
//! refusal payload. Only transport-level failures surface here.

use std::path::PathBuf;

/// Top-level error type for the Attest core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Index error: {0}")]
    Index(String),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt render error: {0}")]
    Prompt(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from generation and embedding provider transports.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed: env var '{var}' not set")]
    AuthFailed { var: String },
}

/// Errors from index construction and loading.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index not found at {path}; run the index command first")]
    NotFound { path: PathBuf },

    #[error("Corpus directory not found: {path}")]
    CorpusMissing { path: PathBuf },

    #[error("Vector count ({vectors}) does not match chunk count ({chunks})")]
    VectorMismatch { vectors: usize, chunks: usize },
}

impl From<IndexError> for CoreError {
    fn from(e: IndexError) -> Self {
        CoreError::Index(e.to_string())
    }
}

/// A type alias for results using the top-level `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;
