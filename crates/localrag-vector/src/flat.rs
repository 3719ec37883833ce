use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::info;

use localrag_core::traits::DenseIndex;
use localrag_core::types::{CandidateResult, Chunk};
use localrag_core::Error;

pub const INDEX_FILE: &str = "dense_index.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Scale `v` to unit length; an all-zero vector is returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 { v.iter().map(|x| x / norm).collect() } else { v.to_vec() }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredVectors {
    dim: Option<usize>,
    vectors: Vec<Vec<f32>>,
}

#[derive(Debug, Default)]
struct FlatState {
    stored: StoredVectors,
    metadata: Vec<Chunk>,
}

/// Exact inner-product search over unit vectors, i.e. cosine similarity.
/// Vectors and metadata are parallel arrays.
#[derive(Debug, Default)]
pub struct FlatIndex {
    state: RwLock<FlatState>,
}

impl FlatIndex {
    pub fn new() -> Self { Self::default() }

    pub fn dim(&self) -> Option<usize> { self.state.read().ok().and_then(|s| s.stored.dim) }
}

fn poisoned<T>(_: T) -> anyhow::Error { anyhow!("dense index lock poisoned") }

#[async_trait]
impl DenseIndex for FlatIndex {
    async fn add(&self, vectors: &[Vec<f32>], metadata: &[Chunk]) -> Result<()> {
        if vectors.len() != metadata.len() {
            bail!("{} vectors but {} metadata entries", vectors.len(), metadata.len());
        }
        let mut state = self.state.write().map_err(poisoned)?;
        let dim = match (state.stored.dim, vectors.first()) {
            (Some(d), _) => d,
            (None, Some(first)) => first.len(),
            (None, None) => return Ok(()),
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::Operation(format!("dimension mismatch: index has {dim}, got {}", bad.len())).into());
        }
        state.stored.dim = Some(dim);
        state.stored.vectors.extend(vectors.iter().map(|v| l2_normalize(v)));
        state.metadata.extend_from_slice(metadata);
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<CandidateResult>> {
        let state = self.state.read().map_err(poisoned)?;
        let Some(dim) = state.stored.dim else { return Ok(Vec::new()) };
        if k == 0 { return Ok(Vec::new()); }
        if query.len() != dim {
            return Err(Error::Operation(format!("query dimension {} does not match index dimension {dim}", query.len())).into());
        }
        let q = l2_normalize(query);
        let mut scored: Vec<(f32, usize)> = state
            .stored
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (v.iter().zip(&q).map(|(a, b)| a * b).sum::<f32>(), i))
            .collect();
        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(score, i)| CandidateResult::from_chunk(&state.metadata[i], score)).collect())
    }

    async fn metadata(&self) -> Result<Vec<Chunk>> { Ok(self.state.read().map_err(poisoned)?.metadata.clone()) }

    async fn len(&self) -> Result<usize> { Ok(self.state.read().map_err(poisoned)?.metadata.len()) }

    fn artifacts(&self, dir: &Path) -> Vec<PathBuf> { vec![dir.join(INDEX_FILE), dir.join(METADATA_FILE)] }

    async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let state = self.state.read().map_err(poisoned)?;
        fs::write(dir.join(INDEX_FILE), serde_json::to_vec(&state.stored)?)?;
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec(&state.metadata)?)?;
        info!(dir = %dir.display(), vectors = state.metadata.len(), "dense index saved");
        Ok(())
    }

    async fn load(&self, dir: &Path) -> Result<()> {
        if let Some(missing) = self.artifacts(dir).into_iter().find(|p| !p.exists()) {
            return Err(Error::PersistenceMissing(missing).into());
        }
        let stored: StoredVectors = serde_json::from_slice(&fs::read(dir.join(INDEX_FILE))?)?;
        let metadata: Vec<Chunk> = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;
        if stored.vectors.len() != metadata.len() {
            bail!("{} has {} vectors but {} has {} entries", INDEX_FILE, stored.vectors.len(), METADATA_FILE, metadata.len());
        }
        let mut state = self.state.write().map_err(poisoned)?;
        info!(dir = %dir.display(), vectors = metadata.len(), "dense index loaded");
        *state = FlatState { stored, metadata };
        Ok(())
    }
}
