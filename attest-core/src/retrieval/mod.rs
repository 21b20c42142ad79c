//! Retrieval: lexical (BM25) and vector rankers over the corpus index,
//! merged by the fusion layer into a single ranked candidate list.

pub mod bm25;
pub mod fusion;
pub mod vector;

use serde::{Deserialize, Serialize};

use crate::config::RetrievalConfig;
use crate::corpus::CorpusIndex;
use crate::embed::Embedder;

pub use bm25::{Bm25, tokenize};
pub use fusion::{Origin, Score, ScoredCandidate, TieBreaker, fuse};
pub use vector::{VectorBackend, VectorIndex, build_vector_index};

/// Which ranker(s) serve a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Lexical,
    Vector,
    #[default]
    Fused,
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lexical" | "bm25" => Ok(Self::Lexical),
            "vector" | "embedding" => Ok(Self::Vector),
            "fused" | "hybrid" => Ok(Self::Fused),
            other => Err(format!("unknown retrieval mode '{other}'")),
        }
    }
}

/// Read-only retriever over an immutable corpus index. Both rankers are
/// built once at construction; queries never mutate shared state.
pub struct Retriever {
    index: CorpusIndex,
    bm25: Bm25,
    vectors: Box<dyn VectorIndex>,
    embedder: Box<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: CorpusIndex, embedder: Box<dyn Embedder>, config: &RetrievalConfig) -> Self {
        let corpus_tokens: Vec<Vec<String>> = index
            .chunks()
            .iter()
            .map(|c| tokenize(&c.text))
            .collect();
        let bm25 = Bm25::new(&corpus_tokens, config.k1, config.b);
        let vectors = build_vector_index(index.vectors(), config.vector_backend);
        Self {
            index,
            bm25,
            vectors,
            embedder,
        }
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    /// Retrieve the top-k candidates for a query. Pure with respect to the
    /// corpus index; an empty corpus yields an empty list, never an error.
    pub fn retrieve(
        &self,
        query: &str,
        k: usize,
        mode: RetrievalMode,
        tie_breaker: TieBreaker,
    ) -> Vec<ScoredCandidate> {
        let lexical = match mode {
            RetrievalMode::Vector => Vec::new(),
            _ => self.top_lexical(query, k),
        };
        let vector = match mode {
            RetrievalMode::Lexical => Vec::new(),
            _ => self.top_vector(query, k),
        };

        let effective_tie_breaker = match mode {
            RetrievalMode::Lexical => TieBreaker::Lexical,
            RetrievalMode::Vector => TieBreaker::Vector,
            RetrievalMode::Fused => tie_breaker,
        };
        let candidates = fuse(
            &lexical,
            &vector,
            self.index.chunks(),
            k,
            effective_tie_breaker,
        );
        tracing::debug!(
            query,
            k,
            ?mode,
            returned = candidates.len(),
            "retrieved candidates"
        );
        candidates
    }

    fn top_lexical(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let scores = self.bm25.scores(&tokenize(query));
        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }

    fn top_vector(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
        let query_vec = self.embedder.embed(query);
        self.vectors.search(&query_vec, k)
    }
}
