//! Generation output schema and boundary validation.
//!
//! The generation provider is untrusted: its output is validated against a
//! strict schema at the boundary and any failure becomes
//! [`GenerationOutcome::Malformed`] — a zero-citation, zero-support outcome
//! the verifier turns into a refusal. No parse failure crosses component
//! boundaries as an error.

use serde::{Deserialize, Serialize};

/// Fixed refusal text returned whenever grounding evidence is insufficient.
pub const REFUSAL_TEXT: &str = "I don't have enough support to answer.";

/// A reference from a generated answer back to a corpus chunk id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

/// A generated answer with citations and self-reported confidence. The
/// confidence is never trusted for the grounding decision; only measured
/// lexical overlap with cited text is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub confidence: f64,
}

impl AnswerPayload {
    /// The fixed refusal payload substituted for unsupported answers.
    pub fn refusal() -> Self {
        Self {
            answer: REFUSAL_TEXT.to_string(),
            citations: Vec::new(),
            confidence: 0.05,
        }
    }

    pub fn is_refusal(&self) -> bool {
        self.answer == REFUSAL_TEXT && self.citations.is_empty()
    }
}

/// Validated generation output: either a schema-conforming payload or a
/// malformed marker consumed uniformly by the verifier.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Parsed(AnswerPayload),
    Malformed,
}

/// Validate raw model output against the answer schema. Confidence must lie
/// in [0, 1]; anything that fails to parse or validate is `Malformed`.
pub fn parse_model_output(text: &str) -> GenerationOutcome {
    match serde_json::from_str::<AnswerPayload>(text) {
        Ok(payload) if (0.0..=1.0).contains(&payload.confidence) => {
            GenerationOutcome::Parsed(payload)
        }
        Ok(payload) => {
            tracing::debug!(confidence = payload.confidence, "confidence out of range");
            GenerationOutcome::Malformed
        }
        Err(e) => {
            tracing::debug!(error = %e, "model output failed schema validation");
            GenerationOutcome::Malformed
        }
    }
}
