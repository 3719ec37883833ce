use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::types::{CandidateResult, Chunk};

/// Produces L2-normalizable vectors; one fixed contract regardless of backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short provider label reported by status endpoints (e.g. `local`).
    fn provider(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_texts(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_texts(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Nearest-neighbour index over chunk embeddings with parallel metadata.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    async fn add(&self, vectors: &[Vec<f32>], metadata: &[Chunk]) -> anyhow::Result<()>;
    /// Up to `k` neighbours ordered by descending similarity; empty on an empty index.
    async fn search(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<CandidateResult>>;
    /// All indexed chunks in insertion order.
    async fn metadata(&self) -> anyhow::Result<Vec<Chunk>>;
    async fn len(&self) -> anyhow::Result<usize>;
    /// Files `save(dir)` writes; `load(dir)` needs every one of them.
    fn artifacts(&self, dir: &Path) -> Vec<PathBuf>;
    async fn save(&self, dir: &Path) -> anyhow::Result<()>;
    async fn load(&self, dir: &Path) -> anyhow::Result<()>;
}

/// Term-scoring index built from chunk text.
pub trait LexicalIndex: Send + Sync {
    /// Create a standalone index over exactly `corpus`.
    fn from_corpus(corpus: &[Chunk]) -> anyhow::Result<Self>
    where
        Self: Sized;
    /// Replace the indexed corpus.
    fn build(&self, corpus: &[Chunk]) -> anyhow::Result<()>;
    /// Up to `k` results ranked by descending score.
    fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<CandidateResult>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool { self.len() == 0 }
    fn save(&self, path: &Path) -> anyhow::Result<()>;
    fn load(&self, path: &Path) -> anyhow::Result<()>;
}
