//! End-to-end question answering pipeline:
//! retrieve -> render prompt -> generate -> verify grounding.

use crate::config::Settings;
use crate::corpus::CorpusIndex;
use crate::error::Result;
use crate::generate::Generator;
use crate::grounding::GroundingVerifier;
use crate::prompt::PromptRenderer;
use crate::retrieval::{RetrievalMode, Retriever, TieBreaker};
use crate::schema::{AnswerPayload, GenerationOutcome, REFUSAL_TEXT, parse_model_output};

/// Grounded QA pipeline over an immutable corpus index.
pub struct QaPipeline {
    settings: Settings,
    retriever: Retriever,
    generator: Box<dyn Generator>,
    prompts: PromptRenderer,
}

impl QaPipeline {
    pub fn new(
        settings: Settings,
        retriever: Retriever,
        generator: Box<dyn Generator>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            retriever,
            generator,
            prompts: PromptRenderer::new()?,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &CorpusIndex {
        self.retriever.index()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answer a question with retrieval and grounding verification.
    ///
    /// `k` and `tau` default to the configured values. Malformed generation
    /// output never surfaces as an error; it becomes the refusal payload.
    pub async fn answer_grounded(
        &self,
        question: &str,
        mode: RetrievalMode,
        k: Option<usize>,
        tau: Option<f64>,
    ) -> Result<AnswerPayload> {
        let k = k.unwrap_or(self.settings.retrieval.k);
        let tau = tau.unwrap_or(self.settings.retrieval.tau);
        let tie_breaker = self.settings.retrieval.tie_breaker;

        let candidates = self.retriever.retrieve(question, k, mode, tie_breaker);
        let prompt = self.prompts.render(question, &candidates)?;
        let response = self.generator.generate_json(&prompt).await?;
        let outcome = parse_model_output(&response.text);

        let verifier = GroundingVerifier::new(tau);
        let payload = verifier.verify_and_finalize(outcome, &candidates, self.index());
        tracing::info!(
            question,
            ?mode,
            k,
            tau,
            refused = payload.is_refusal(),
            latency_ms = response.latency_ms,
            "answered"
        );
        Ok(payload)
    }

    /// Answer without retrieval or verification — the ungrounded baseline
    /// used for comparison in evaluation. Malformed output maps to a
    /// zero-confidence refusal.
    pub async fn answer_baseline(&self, question: &str) -> Result<AnswerPayload> {
        let prompt = self.prompts.render(question, &[])?;
        let response = self.generator.generate_json(&prompt).await?;
        match parse_model_output(&response.text) {
            GenerationOutcome::Parsed(payload) => Ok(payload),
            GenerationOutcome::Malformed => Ok(AnswerPayload {
                answer: REFUSAL_TEXT.to_string(),
                citations: Vec::new(),
                confidence: 0.0,
            }),
        }
    }

    /// Apply the tie-breaker semantics of [`retrieve`](Retriever::retrieve)
    /// with the configured tie-breaker, exposed for evaluation callers.
    pub fn retrieve(&self, question: &str, k: usize, mode: RetrievalMode) -> Vec<crate::retrieval::ScoredCandidate> {
        self.retriever
            .retrieve(question, k, mode, self.settings.retrieval.tie_breaker)
    }

    pub fn default_tie_breaker(&self) -> TieBreaker {
        self.settings.retrieval.tie_breaker
    }
}
