//! Grounding verification: measure lexical overlap between a generated
//! answer and its cited source text, and replace unsupported answers with
//! the fixed refusal payload.
//!
//! The support score is the fraction of the answer's word bigrams that also
//! occur in the concatenated evidence. An answer is refused when its support
//! falls below the calibrated threshold `tau`, or when it carries zero
//! citations — the self-reported confidence plays no part in the decision.

use std::collections::HashSet;

use crate::corpus::CorpusIndex;
use crate::retrieval::ScoredCandidate;
use crate::schema::{AnswerPayload, GenerationOutcome};

fn words(text: &str) -> Vec<String> {
    // \w+ style tokens: alphanumerics and underscore, lowercased.
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn bigrams(text: &str) -> HashSet<(String, String)> {
    let tokens = words(text);
    tokens
        .windows(2)
        .map(|w| (w[0].clone(), w[1].clone()))
        .collect()
}

/// Fraction of the answer's bigrams attested by the concatenated evidence.
/// An answer with fewer than two tokens has no bigrams and scores 0.0.
pub fn support_score(answer: &str, evidence: &[String]) -> f64 {
    let answer_bigrams = bigrams(answer);
    if answer_bigrams.is_empty() {
        return 0.0;
    }
    let evidence_bigrams = bigrams(&evidence.join(" "));
    let overlap = answer_bigrams
        .iter()
        .filter(|b| evidence_bigrams.contains(*b))
        .count();
    overlap as f64 / answer_bigrams.len() as f64
}

/// Grounding verifier holding the calibrated threshold.
#[derive(Debug, Clone, Copy)]
pub struct GroundingVerifier {
    tau: f64,
}

impl GroundingVerifier {
    pub fn new(tau: f64) -> Self {
        Self { tau }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }

    /// Verify a proposed answer against its cited evidence and finalize it.
    ///
    /// Evidence is the text of resolvable citations; unresolvable citations
    /// are excluded silently. If none resolve, the full candidate texts are
    /// used as fallback evidence. The payload is replaced wholesale by the
    /// refusal payload when support falls below `tau` or when it carries
    /// zero citations. Pure: no mutation of corpus or caches, and idempotent
    /// on an already-refused payload.
    pub fn verify_and_finalize(
        &self,
        outcome: GenerationOutcome,
        candidates: &[ScoredCandidate],
        index: &CorpusIndex,
    ) -> AnswerPayload {
        let payload = match outcome {
            GenerationOutcome::Parsed(p) => p,
            GenerationOutcome::Malformed => {
                tracing::debug!("malformed generation output; refusing");
                return AnswerPayload::refusal();
            }
        };

        let cited_texts: Vec<String> = payload
            .citations
            .iter()
            .filter_map(|c| index.get(&c.id).map(|chunk| chunk.text.clone()))
            .collect();
        let evidence: Vec<String> = if cited_texts.is_empty() {
            candidates.iter().map(|c| c.chunk.text.clone()).collect()
        } else {
            cited_texts
        };

        let support = support_score(&payload.answer, &evidence);
        if support < self.tau || payload.citations.is_empty() {
            tracing::debug!(support, tau = self.tau, "answer refused");
            return AnswerPayload::refusal();
        }
        tracing::debug!(support, tau = self.tau, "answer accepted");
        payload
    }
}
