//! Answer prompt rendering.
//!
//! Thin template-substitution step over `(question, contexts)`; the
//! retrieval and verification logic never depends on the prompt wording.

use handlebars::Handlebars;
use serde_json::json;

use crate::error::{CoreError, Result};
use crate::retrieval::ScoredCandidate;

const ANSWER_TEMPLATE: &str = "\
You answer questions using ONLY the context passages below.
Respond with a single JSON object: {\"answer\": string, \"citations\": [{\"id\": string}], \"confidence\": number between 0 and 1}.
Cite the ids of the passages that support your answer. If the context does not contain the answer, respond with {\"answer\": \"I don't have enough support to answer.\", \"citations\": [], \"confidence\": 0.05}.

{{#each contexts}}
[{{id}}] {{title}}
{{text}}

{{/each}}
Question: {{question}}
";

/// Renders the answer prompt from a question and retrieved candidates.
pub struct PromptRenderer {
    registry: Handlebars<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        registry
            .register_template_string("answer", ANSWER_TEMPLATE)
            .map_err(|e| CoreError::Prompt(e.to_string()))?;
        Ok(Self { registry })
    }

    pub fn render(&self, question: &str, contexts: &[ScoredCandidate]) -> Result<String> {
        let contexts: Vec<_> = contexts
            .iter()
            .map(|c| {
                json!({
                    "id": c.chunk.id,
                    "title": c.chunk.title,
                    "text": c.chunk.text,
                })
            })
            .collect();
        self.registry
            .render("answer", &json!({ "question": question, "contexts": contexts }))
            .map_err(|e| CoreError::Prompt(e.to_string()))
    }
}
