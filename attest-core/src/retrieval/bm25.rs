//! From-scratch Okapi BM25 lexical ranker.
//!
//! Term weight saturates with in-document frequency (constant `k1`), is
//! normalized by document length relative to the corpus average (constant
//! `b`), and each term carries the Robertson/Sparck Jones idf with a `+1`
//! inside the log so weights stay non-negative even for terms present in
//! most documents.

use std::collections::HashMap;

/// Case-insensitive whitespace tokenizer shared by documents and queries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Precomputed lexical statistics for a fixed corpus.
#[derive(Debug)]
pub struct Bm25 {
    k1: f32,
    b: f32,
    n: usize,
    doc_len: Vec<usize>,
    avgdl: f32,
    tf: Vec<HashMap<String, usize>>,
    idf: HashMap<String, f32>,
}

impl Bm25 {
    pub fn new(corpus_tokens: &[Vec<String>], k1: f32, b: f32) -> Self {
        let n = corpus_tokens.len();
        let doc_len: Vec<usize> = corpus_tokens.iter().map(|d| d.len()).collect();
        let avgdl = doc_len.iter().sum::<usize>() as f32 / n.max(1) as f32;

        let tf: Vec<HashMap<String, usize>> = corpus_tokens
            .iter()
            .map(|doc| {
                let mut counts = HashMap::new();
                for token in doc {
                    *counts.entry(token.clone()).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        let mut df: HashMap<&str, usize> = HashMap::new();
        for counts in &tf {
            for term in counts.keys() {
                *df.entry(term).or_insert(0) += 1;
            }
        }
        let idf = df
            .into_iter()
            .map(|(term, d)| {
                let weight = ((n as f32 - d as f32 + 0.5) / (d as f32 + 0.5) + 1.0).ln();
                (term.to_string(), weight)
            })
            .collect();

        Self {
            k1,
            b,
            n,
            doc_len,
            avgdl,
            tf,
            idf,
        }
    }

    /// Score every document against the query. A term absent from a document
    /// contributes zero; documents matching no term score 0.0 but are never
    /// omitted.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.n];
        for (i, tf_d) in self.tf.iter().enumerate() {
            let denom_norm =
                1.0 - self.b + self.b * (self.doc_len[i] as f32 / self.avgdl.max(1.0));
            for term in query_tokens {
                let Some(&freq) = tf_d.get(term) else {
                    continue;
                };
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                let freq = freq as f32;
                let num = freq * (self.k1 + 1.0);
                let den = freq + self.k1 * denom_norm;
                scores[i] += idf * (num / den.max(1e-9));
            }
        }
        scores
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K1: f32 = 1.5;
    const B: f32 = 0.75;

    fn docs(texts: &[&str]) -> Vec<Vec<String>> {
        texts.iter().map(|t| tokenize(t)).collect()
    }

    #[test]
    fn test_tokenize_case_insensitive() {
        assert_eq!(tokenize("The Sky  IS blue."), vec!["the", "sky", "is", "blue."]);
    }

    #[test]
    fn test_idf_single_doc_closed_form() {
        // One chunk containing the term once:
        // idf = ln((1 - 1 + 0.5) / (1 + 0.5) + 1) = ln(4/3)
        // With doc length == average length the b-normalization denominator
        // is 1, so the score collapses to idf * (k1+1)/(1+k1) = idf.
        let bm25 = Bm25::new(&docs(&["term"]), K1, B);
        let scores = bm25.scores(&tokenize("term"));
        let expected = (4.0f32 / 3.0).ln();
        assert!((scores[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_absent_term_scores_zero() {
        let bm25 = Bm25::new(&docs(&["the sky is blue", "grass is green"]), K1, B);
        let scores = bm25.scores(&tokenize("zeppelin"));
        assert_eq!(scores, vec![0.0, 0.0]);
        // Zero-scoring documents still appear in the output.
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_term_frequency_saturates() {
        let bm25 = Bm25::new(&docs(&["cat", "cat cat cat cat cat cat cat cat"]), K1, B);
        let once = bm25.scores(&tokenize("cat"))[0];
        let many = bm25.scores(&tokenize("cat"))[1];
        // Repetition helps, but sub-linearly: eight occurrences score well
        // under eight times one occurrence.
        assert!(many > 0.0);
        assert!(many < once * 8.0);
    }

    #[test]
    fn test_relevance_ordering() {
        let bm25 = Bm25::new(
            &docs(&[
                "the sky is blue",
                "grass is green",
                "the ocean is blue and the sky is blue",
            ]),
            K1,
            B,
        );
        let scores = bm25.scores(&tokenize("blue sky"));
        assert!(scores[0] > scores[1]);
        assert!(scores[2] > scores[1]);
    }

    #[test]
    fn test_deterministic() {
        let corpus = docs(&["alpha beta gamma", "beta gamma delta"]);
        let bm25 = Bm25::new(&corpus, K1, B);
        let q = tokenize("beta delta");
        assert_eq!(bm25.scores(&q), bm25.scores(&q));
    }

    #[test]
    fn test_empty_corpus() {
        let bm25 = Bm25::new(&[], K1, B);
        assert!(bm25.is_empty());
        assert!(bm25.scores(&tokenize("anything")).is_empty());
    }
}
