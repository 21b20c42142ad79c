//! End-to-end pipeline tests with a scripted generation provider.

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use attest_core::config::Settings;
use attest_core::corpus::{Chunk, CorpusIndex, IndexMeta};
use attest_core::embed::{Embedder, HashEmbedder};
use attest_core::error::GenerationError;
use attest_core::eval::{self, DevExample, Expectation, SafetyPrompt};
use attest_core::generate::{GenerationResponse, Generator};
use attest_core::pipeline::QaPipeline;
use attest_core::retrieval::{RetrievalMode, Retriever, TieBreaker};
use attest_core::schema::REFUSAL_TEXT;

/// Scripted generator: returns the response paired with the first needle
/// found in the prompt, else the fallback.
struct MockGenerator {
    rules: Vec<(&'static str, &'static str)>,
    fallback: &'static str,
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate_json(&self, prompt: &str) -> Result<GenerationResponse, GenerationError> {
        let text = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle))
            .map(|(_, response)| *response)
            .unwrap_or(self.fallback);
        Ok(GenerationResponse {
            text: text.to_string(),
            tokens_in: prompt.split_whitespace().count(),
            tokens_out: 12,
            latency_ms: 1,
        })
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

const SKY_ANSWER: &str =
    r#"{"answer":"The sky is blue.","citations":[{"id":"facts.md::p000"}],"confidence":0.9}"#;
// Support against facts.md::p002 ("alpha beta") is exactly 0.25:
// one of four answer bigrams is attested.
const WEAK_ANSWER: &str =
    r#"{"answer":"alpha beta gamma delta epsilon","citations":[{"id":"facts.md::p002"}],"confidence":0.9}"#;

fn test_index() -> CorpusIndex {
    let texts = ["The sky is blue.", "Grass is green.", "alpha beta"];
    let embedder = HashEmbedder::new(128);
    let chunks: Vec<Chunk> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| Chunk {
            id: format!("facts.md::p{i:03}"),
            title: "facts".into(),
            source: "facts.md".into(),
            text: t.to_string(),
        })
        .collect();
    let vectors: Vec<Vec<f32>> = texts.iter().map(|t| embedder.embed(t)).collect();
    let meta = IndexMeta {
        embedding_model: "hash".into(),
        dim: 128,
        count: chunks.len(),
        corpus_sha: "abcdef0123".into(),
    };
    CorpusIndex::from_parts(chunks, vectors, meta).unwrap()
}

fn test_pipeline(generator: MockGenerator, settings: Settings) -> QaPipeline {
    let index = test_index();
    let retriever = Retriever::new(index, Box::new(HashEmbedder::new(128)), &settings.retrieval);
    QaPipeline::new(settings, retriever, Box::new(generator)).unwrap()
}

fn sky_generator() -> MockGenerator {
    MockGenerator {
        rules: vec![("What color is the sky?", SKY_ANSWER)],
        fallback: WEAK_ANSWER,
    }
}

#[tokio::test]
async fn grounded_answer_passes_through_unchanged() {
    let pipeline = test_pipeline(sky_generator(), Settings::default());

    // Fused retrieval ranks the sky chunk first for the sky question.
    let candidates = pipeline.retrieve("What color is the sky?", 1, RetrievalMode::Fused);
    assert_eq!(candidates[0].chunk.id, "facts.md::p000");

    // The answer's bigrams are fully contained in the cited chunk, so the
    // payload survives verification at any tau up to 1.0.
    let payload = pipeline
        .answer_grounded("What color is the sky?", RetrievalMode::Fused, None, Some(1.0))
        .await
        .unwrap();
    assert_eq!(payload.answer, "The sky is blue.");
    assert_eq!(payload.citations.len(), 1);
    assert!((payload.confidence - 0.9).abs() < f64::EPSILON);
}

#[tokio::test]
async fn lexical_and_vector_modes_agree_on_top_candidate() {
    let pipeline = test_pipeline(sky_generator(), Settings::default());
    for mode in [RetrievalMode::Lexical, RetrievalMode::Vector] {
        let candidates = pipeline.retrieve("What color is the sky?", 1, mode);
        assert_eq!(candidates[0].chunk.id, "facts.md::p000", "mode {mode:?}");
    }
}

#[tokio::test]
async fn malformed_generation_output_becomes_refusal() {
    let generator = MockGenerator {
        rules: vec![],
        fallback: "I believe the answer is probably blue",
    };
    let pipeline = test_pipeline(generator, Settings::default());
    let payload = pipeline
        .answer_grounded("What color is the sky?", RetrievalMode::Fused, None, None)
        .await
        .unwrap();
    assert_eq!(payload.answer, REFUSAL_TEXT);
    assert!(payload.citations.is_empty());
}

#[tokio::test]
async fn baseline_maps_malformed_to_zero_confidence_refusal() {
    let generator = MockGenerator {
        rules: vec![],
        fallback: "{not even json",
    };
    let pipeline = test_pipeline(generator, Settings::default());
    let payload = pipeline.answer_baseline("Who wrote this?").await.unwrap();
    assert_eq!(payload.answer, REFUSAL_TEXT);
    assert_eq!(payload.confidence, 0.0);
}

#[tokio::test]
async fn weakly_supported_answer_is_refused_at_default_tau() {
    // Support 0.25 < default tau 0.4.
    let generator = MockGenerator {
        rules: vec![],
        fallback: WEAK_ANSWER,
    };
    let pipeline = test_pipeline(generator, Settings::default());
    let payload = pipeline
        .answer_grounded("Tell me about alpha", RetrievalMode::Fused, None, None)
        .await
        .unwrap();
    assert!(payload.answer == REFUSAL_TEXT);
}

fn safety_set(n: usize) -> Vec<SafetyPrompt> {
    (0..n)
        .map(|i| SafetyPrompt {
            id: format!("s{i}"),
            prompt: format!("Please speculate wildly, attempt {i}"),
            expect: Expectation::Refuse,
        })
        .collect()
}

#[tokio::test]
async fn calibration_returns_first_passing_threshold() {
    // Devset answers are fully supported at every threshold. Safety prompts
    // draw the weak (0.25-support) answer: at tau=0.2 it passes verification
    // and every refuse expectation fails; at tau=0.4 and 0.6 it is refused.
    // The loop must return 0.4 — the first passing, not the strictest.
    let pipeline = test_pipeline(sky_generator(), Settings::default());
    let dev = vec![DevExample {
        id: None,
        question: "What color is the sky?".into(),
        answer: "The sky is blue.".into(),
    }];
    let tau = eval::calibrate(
        &pipeline,
        &dev,
        &safety_set(8),
        &[0.2, 0.4, 0.6],
        4,
        RetrievalMode::Fused,
    )
    .await
    .unwrap();
    assert!((tau - 0.4).abs() < f64::EPSILON);
}

#[tokio::test]
async fn calibration_falls_back_to_strictest_when_none_pass() {
    // Every prompt (dev included) gets the weak answer: the devset citation
    // never clears the support floor once refused, and at the loosest tau the
    // safety bar fails, so no candidate passes.
    let generator = MockGenerator {
        rules: vec![],
        fallback: WEAK_ANSWER,
    };
    let pipeline = test_pipeline(generator, Settings::default());
    let dev = vec![DevExample {
        id: None,
        question: "What color is the sky?".into(),
        answer: "The sky is blue.".into(),
    }];
    let tau = eval::calibrate(
        &pipeline,
        &dev,
        &safety_set(8),
        &[0.2, 0.4, 0.6],
        4,
        RetrievalMode::Fused,
    )
    .await
    .unwrap();
    assert!((tau - 0.6).abs() < f64::EPSILON);
}

#[tokio::test]
async fn evaluate_scores_devset_and_writes_experiment_log() {
    let dir = tempfile::tempdir().unwrap();
    let devset_path = dir.path().join("devset.jsonl");
    let safety_path = dir.path().join("safety.jsonl");
    let log_path = dir.path().join("logs/experiments.csv");

    std::fs::write(
        &devset_path,
        "{\"question\":\"What color is the sky?\",\"answer\":\"The sky is blue.\"}\n",
    )
    .unwrap();
    let safety_lines: String = safety_set(8)
        .iter()
        .map(|s| serde_json::to_string(s).unwrap() + "\n")
        .collect();
    std::fs::write(&safety_path, safety_lines).unwrap();

    let mut settings = Settings::default();
    settings.paths.devset = devset_path;
    settings.paths.safety_set = safety_path;
    settings.paths.experiments_log = log_path.clone();

    let pipeline = test_pipeline(sky_generator(), settings);
    let scores = eval::evaluate(&pipeline, &[0.2, 0.4, 0.6]).await.unwrap();

    assert!((scores.tau - 0.4).abs() < f64::EPSILON);
    assert!((scores.mean_f1() - 1.0).abs() < 1e-9);
    assert!((scores.valid_citation_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(scores.safety_pass, 8);
    assert_eq!(scores.safety_total, 8);

    let log = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("ts,provider,model_id"));
    assert!(lines[1].contains("api.groq.com"));
    assert!(lines[1].contains("abcdef0123"));
}

#[test]
fn tie_breaker_default_comes_from_settings() {
    let settings = Settings::default();
    assert_eq!(settings.retrieval.tie_breaker, TieBreaker::Vector);
}
