//! Vector similarity search over precomputed corpus embeddings.
//!
//! Two exact backends implement the same trait and return identical top-k
//! for small corpora, so either can validate the other. The trait seam is
//! also where an approximate nearest-neighbor index would plug in.

use serde::{Deserialize, Serialize};

use crate::embed::l2_normalize;

/// Backend selection, fixed at construction time via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// Pre-normalized matrix, inner product, partial top-k selection.
    #[default]
    Flat,
    /// Per-query cosine similarity scan with a full sort.
    Scan,
}

/// Nearest-neighbor search over the corpus vectors. Scores are cosine
/// similarities; ties break by original corpus order (first-seen wins).
pub trait VectorIndex: Send + Sync {
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the configured backend over the corpus vectors.
pub fn build_vector_index(vectors: &[Vec<f32>], backend: VectorBackend) -> Box<dyn VectorIndex> {
    match backend {
        VectorBackend::Flat => Box::new(FlatIndex::new(vectors.to_vec())),
        VectorBackend::Scan => Box::new(ScanIndex::new(vectors.to_vec())),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn rank_descending(scored: &mut Vec<(usize, f32)>, k: usize) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);
}

/// Exact brute-force index over unit vectors: normalizes at build time and
/// scores with a plain inner product. Uses partial selection so only the
/// top-k slice is fully ordered.
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(mut vectors: Vec<Vec<f32>>) -> Self {
        for v in &mut vectors {
            l2_normalize(v);
        }
        Self { vectors }
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let dot: f32 = v.iter().zip(q.iter()).map(|(x, y)| x * y).sum();
                (i, dot)
            })
            .collect();

        if k < scored.len() {
            let cmp = |a: &(usize, f32), b: &(usize, f32)| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            };
            scored.select_nth_unstable_by(k, cmp);
            scored.truncate(k);
            scored.sort_by(cmp);
            scored
        } else {
            rank_descending(&mut scored, k);
            scored
        }
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

/// Cosine-scan index: stores vectors as given and computes cosine similarity
/// per query with a full stable sort. Behaviorally substitutable with
/// [`FlatIndex`]; kept as the reference implementation to validate against.
pub struct ScanIndex {
    vectors: Vec<Vec<f32>>,
}

impl ScanIndex {
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }
}

impl VectorIndex for ScanIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        rank_descending(&mut scored, k);
        scored
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}
