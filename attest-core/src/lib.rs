//! # attest-core — grounded question answering over a document corpus
//!
//! Retrieval combines a from-scratch BM25 lexical ranker with cosine
//! similarity over precomputed embeddings; the fusion layer merges both
//! rankings while keeping missing scores explicit. Every generated answer
//! passes through a grounding verifier that measures bigram overlap with
//! cited source text and substitutes a fixed refusal payload when support
//! falls below the calibrated threshold. The calibration loop selects that
//! threshold offline against a labeled devset and a safety-prompt set.
//!
//! External collaborators (embedding and generation providers, prompt
//! templates) sit behind traits; the algorithmic core is synchronous and
//! pure with respect to the immutable corpus index.

pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod eval;
pub mod generate;
pub mod grounding;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod schema;

pub use config::{Settings, load_settings};
pub use corpus::{Chunk, CorpusIndex, IndexMeta, build_index};
pub use embed::{Embedder, HashEmbedder, create_embedder};
pub use error::{CoreError, Result};
pub use generate::{GenerationResponse, Generator, OpenAiCompatGenerator};
pub use grounding::{GroundingVerifier, support_score};
pub use pipeline::QaPipeline;
pub use retrieval::{RetrievalMode, Retriever, Score, ScoredCandidate, TieBreaker};
pub use schema::{AnswerPayload, Citation, GenerationOutcome, REFUSAL_TEXT, parse_model_output};
