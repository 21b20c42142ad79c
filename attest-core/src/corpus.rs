//! Corpus index: immutable chunk collection with precomputed vectors.
//!
//! The index is built once from a directory of markdown documents and read
//! back for every query. Chunks are paragraph blocks with stable positional
//! ids (`file.md::p007`), so a citation id is enough to locate the passage
//! in its source document.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::embed::Embedder;
use crate::error::{CoreError, IndexError, Result};

const CHUNKS_FILE: &str = "chunks.jsonl";
const VECTORS_FILE: &str = "vectors.json";
const META_FILE: &str = "meta.json";

/// A contiguous span of corpus text with a stable identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub title: String,
    pub source: String,
    pub text: String,
}

/// Metadata describing how an index was built. The `corpus_sha` is a content
/// checksum used to detect a stale index after the corpus changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub embedding_model: String,
    pub dim: usize,
    pub count: usize,
    pub corpus_sha: String,
}

/// Immutable corpus index: chunks, their unit-normalized vectors, and an
/// id lookup map. Never mutated after load; concurrent reads are safe.
#[derive(Debug)]
pub struct CorpusIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    meta: IndexMeta,
    by_id: HashMap<String, usize>,
}

impl CorpusIndex {
    /// Assemble an index from already-built parts. Used by tests and by
    /// callers that manage persistence themselves.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>, meta: IndexMeta) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::VectorMismatch {
                vectors: vectors.len(),
                chunks: chunks.len(),
            }
            .into());
        }
        let by_id = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Ok(Self {
            chunks,
            vectors,
            meta,
            by_id,
        })
    }

    /// Load a previously built index from `index_dir`.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let chunks_path = index_dir.join(CHUNKS_FILE);
        if !chunks_path.exists() {
            return Err(IndexError::NotFound {
                path: index_dir.to_path_buf(),
            }
            .into());
        }

        let mut chunks = Vec::new();
        let reader = BufReader::new(std::fs::File::open(&chunks_path)?);
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            chunks.push(serde_json::from_str::<Chunk>(&line)?);
        }

        let vectors: Vec<Vec<f32>> =
            serde_json::from_str(&std::fs::read_to_string(index_dir.join(VECTORS_FILE))?)?;
        let meta: IndexMeta =
            serde_json::from_str(&std::fs::read_to_string(index_dir.join(META_FILE))?)?;

        Self::from_parts(chunks, vectors, meta)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Look up a chunk by citation id. A citation is resolvable iff this
    /// returns `Some`.
    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.by_id.get(id).map(|&i| &self.chunks[i])
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Split a markdown document into paragraph blocks on blank lines.
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for line in text.trim().lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                blocks.push(current.trim().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        blocks.push(current.trim().to_string());
    }
    blocks
}

/// Build an index from every `*.md` file in `corpus_dir` (sorted by name),
/// embedding each paragraph chunk, and persist it under `index_dir`.
pub fn build_index(
    corpus_dir: &Path,
    index_dir: &Path,
    embedder: &dyn Embedder,
) -> Result<IndexMeta> {
    if !corpus_dir.is_dir() {
        return Err(IndexError::CorpusMissing {
            path: corpus_dir.to_path_buf(),
        }
        .into());
    }

    let mut doc_paths: Vec<_> = std::fs::read_dir(corpus_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    doc_paths.sort();

    let mut chunks = Vec::new();
    let mut hasher = Sha256::new();
    for path in &doc_paths {
        let fname = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let body = std::fs::read_to_string(path)?;
        hasher.update(body.as_bytes());

        let title = fname.trim_end_matches(".md").to_string();
        for (i, block) in split_blocks(&body).into_iter().enumerate() {
            chunks.push(Chunk {
                id: format!("{fname}::p{i:03}"),
                title: title.clone(),
                source: fname.clone(),
                text: block,
            });
        }
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    let vectors = embedder.embed_batch(&texts);

    let corpus_sha = {
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..10].to_string()
    };
    let meta = IndexMeta {
        embedding_model: embedder.provider_name().to_string(),
        dim: embedder.dimensions(),
        count: chunks.len(),
        corpus_sha,
    };

    std::fs::create_dir_all(index_dir)?;
    let mut chunks_out = std::fs::File::create(index_dir.join(CHUNKS_FILE))?;
    for chunk in &chunks {
        serde_json::to_writer(&mut chunks_out, chunk)?;
        chunks_out.write_all(b"\n")?;
    }
    std::fs::write(
        index_dir.join(VECTORS_FILE),
        serde_json::to_string(&vectors)?,
    )?;
    std::fs::write(
        index_dir.join(META_FILE),
        serde_json::to_string_pretty(&meta)?,
    )?;

    tracing::info!(
        count = meta.count,
        dim = meta.dim,
        corpus_sha = %meta.corpus_sha,
        "Built corpus index"
    );
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbedder;
    use pretty_assertions::assert_eq;

    fn meta_for(count: usize) -> IndexMeta {
        IndexMeta {
            embedding_model: "hash".into(),
            dim: 4,
            count,
            corpus_sha: "0000000000".into(),
        }
    }

    #[test]
    fn test_split_blocks() {
        let text = "First paragraph\nstill first.\n\nSecond paragraph.\n\n\nThird.";
        let blocks = split_blocks(text);
        assert_eq!(
            blocks,
            vec![
                "First paragraph\nstill first.".to_string(),
                "Second paragraph.".to_string(),
                "Third.".to_string(),
            ]
        );
    }

    #[test]
    fn test_split_blocks_empty() {
        assert!(split_blocks("").is_empty());
        assert!(split_blocks("\n\n  \n").is_empty());
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let chunks = vec![Chunk {
            id: "a.md::p000".into(),
            title: "a".into(),
            source: "a.md".into(),
            text: "hello".into(),
        }];
        let err = CorpusIndex::from_parts(chunks, vec![], meta_for(1)).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_build_and_load_roundtrip() {
        let corpus = tempfile::tempdir().unwrap();
        let index = tempfile::tempdir().unwrap();
        std::fs::write(
            corpus.path().join("sky.md"),
            "The sky is blue.\n\nSunsets are red.",
        )
        .unwrap();
        std::fs::write(corpus.path().join("grass.md"), "Grass is green.").unwrap();

        let embedder = HashEmbedder::new(32);
        let meta = build_index(corpus.path(), index.path(), &embedder).unwrap();
        assert_eq!(meta.count, 3);
        assert_eq!(meta.dim, 32);
        assert_eq!(meta.corpus_sha.len(), 10);

        let loaded = CorpusIndex::load(index.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        // Sorted by file name: grass.md before sky.md
        assert_eq!(loaded.chunks()[0].id, "grass.md::p000");
        assert_eq!(loaded.chunks()[1].id, "sky.md::p000");
        assert_eq!(loaded.chunks()[2].id, "sky.md::p001");
        assert!(loaded.get("sky.md::p001").is_some());
        assert!(loaded.get("sky.md::p009").is_none());
    }

    #[test]
    fn test_build_sha_deterministic() {
        let corpus = tempfile::tempdir().unwrap();
        std::fs::write(corpus.path().join("a.md"), "Alpha beta.").unwrap();
        let embedder = HashEmbedder::new(8);

        let idx1 = tempfile::tempdir().unwrap();
        let idx2 = tempfile::tempdir().unwrap();
        let m1 = build_index(corpus.path(), idx1.path(), &embedder).unwrap();
        let m2 = build_index(corpus.path(), idx2.path(), &embedder).unwrap();
        assert_eq!(m1.corpus_sha, m2.corpus_sha);
    }

    #[test]
    fn test_load_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = CorpusIndex::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Index(_)));
    }
}
