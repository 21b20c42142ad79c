//! Fusion of independent lexical and vector rankings.
//!
//! A chunk surfaced by only one ranker carries the other axis as
//! [`Score::Absent`] — never `0.0`. A present zero (or negative cosine) is a
//! real measurement; absence means the ranker did not surface the chunk at
//! all, and it must sort below every present value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::corpus::Chunk;

/// A per-axis retrieval score: present with a value, or absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Present(f32),
    Absent,
}

impl Score {
    pub fn value(&self) -> Option<f32> {
        match self {
            Score::Present(v) => Some(*v),
            Score::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Score::Present(_))
    }

    /// Descending comparison with `Absent` ordered last.
    fn cmp_desc(&self, other: &Score) -> Ordering {
        match (self, other) {
            (Score::Present(a), Score::Present(b)) => {
                b.partial_cmp(a).unwrap_or(Ordering::Equal)
            }
            (Score::Present(_), Score::Absent) => Ordering::Less,
            (Score::Absent, Score::Present(_)) => Ordering::Greater,
            (Score::Absent, Score::Absent) => Ordering::Equal,
        }
    }
}

/// Which ranker(s) surfaced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Lexical,
    Vector,
    Both,
}

/// Score axis used to order the merged candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    Lexical,
    #[default]
    Vector,
}

/// A retrieved chunk with its per-axis scores. Produced transiently per
/// query; at least one axis is always present.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub chunk: Chunk,
    pub lexical: Score,
    pub vector: Score,
    pub origin: Origin,
}

impl ScoredCandidate {
    fn axis(&self, tie_breaker: TieBreaker) -> Score {
        match tie_breaker {
            TieBreaker::Lexical => self.lexical,
            TieBreaker::Vector => self.vector,
        }
    }
}

/// Merge two top-k rankings (corpus position, score) into one candidate list
/// ordered by the tie-breaker axis, `Absent` last, corpus order on equal
/// scores. Deterministic for a fixed tie-breaker.
pub fn fuse(
    lexical: &[(usize, f32)],
    vector: &[(usize, f32)],
    chunks: &[Chunk],
    k: usize,
    tie_breaker: TieBreaker,
) -> Vec<ScoredCandidate> {
    let mut merged: HashMap<usize, (Score, Score)> = HashMap::new();
    for &(idx, score) in lexical {
        merged.entry(idx).or_insert((Score::Absent, Score::Absent)).0 = Score::Present(score);
    }
    for &(idx, score) in vector {
        merged.entry(idx).or_insert((Score::Absent, Score::Absent)).1 = Score::Present(score);
    }

    let mut candidates: Vec<(usize, ScoredCandidate)> = merged
        .into_iter()
        .map(|(idx, (lex, vec))| {
            let origin = match (lex.is_present(), vec.is_present()) {
                (true, true) => Origin::Both,
                (true, false) => Origin::Lexical,
                // Merge entries always come from at least one ranking.
                _ => Origin::Vector,
            };
            (
                idx,
                ScoredCandidate {
                    chunk: chunks[idx].clone(),
                    lexical: lex,
                    vector: vec,
                    origin,
                },
            )
        })
        .collect();

    candidates.sort_by(|(ia, a), (ib, b)| {
        a.axis(tie_breaker)
            .cmp_desc(&b.axis(tie_breaker))
            .then(ia.cmp(ib))
    });
    candidates.truncate(k);
    candidates.into_iter().map(|(_, c)| c).collect()
}
