//! localrag-hybrid
//!
//! The retrieval context object: adapters, chunk builder, embedder and both
//! index collaborators behind one handle, plus the quick/deep query modes and
//! the coalesced search service.
pub mod fusion;
pub mod service;

use anyhow::{ensure, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use localrag_core::config::Settings;
use localrag_core::traits::{DenseIndex, Embedder, LexicalIndex};
use localrag_core::types::{CandidateResult, FileOutcome, IndexStatus, IngestReport, SearchResponse, SearchSource};
use localrag_core::{unified_chunk, ChunkParams, Error};
use localrag_ingest::{DocumentLoader, PdfAdapter};
use localrag_text::Bm25Index;
use localrag_vector::{FlatIndex, LanceIndex};

pub use fusion::fuse;
pub use service::SearchService;

/// Lexical corpus file written next to the dense artifacts.
pub const LEXICAL_FILE: &str = "bm25.json";
pub const DEFAULT_ALPHA: f32 = 0.6;

pub type FlatPipeline = RagPipeline<FlatIndex, Bm25Index>;
pub type LancePipeline = RagPipeline<LanceIndex, Bm25Index>;

pub struct RagPipeline<D, L>
where
    D: DenseIndex,
    L: LexicalIndex,
{
    loader: DocumentLoader,
    params: ChunkParams,
    embedder: Box<dyn Embedder>,
    dense: D,
    lexical: L,
    alpha: f32,
}

impl<D, L> RagPipeline<D, L>
where
    D: DenseIndex,
    L: LexicalIndex,
{
    pub fn new(embedder: Box<dyn Embedder>, dense: D, lexical: L) -> Self {
        Self { loader: DocumentLoader::default(), params: ChunkParams::default(), embedder, dense, lexical, alpha: DEFAULT_ALPHA }
    }

    /// Chunking parameters (also used for PDF windows) and fusion weight from settings.
    pub fn with_settings(self, settings: &Settings) -> Self {
        let params = settings.chunking;
        Self {
            loader: DocumentLoader::new(PdfAdapter::new(params.max_words, params.overlap)),
            params,
            alpha: settings.search.alpha,
            ..self
        }
    }

    pub fn with_params(mut self, params: ChunkParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn params(&self) -> &ChunkParams { &self.params }
    pub fn dense(&self) -> &D { &self.dense }
    pub fn lexical(&self) -> &L { &self.lexical }
    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    /// Extract, chunk, embed and index one file. The lexical index is rebuilt
    /// from everything the dense index holds afterwards.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let loader = self.loader.clone();
        let owned = path.to_path_buf();
        let blocks = tokio::task::spawn_blocking(move || loader.process_file(&owned)).await??;
        let chunks = unified_chunk(&blocks, &self.params);
        if chunks.is_empty() {
            info!(path = %path.display(), "no chunks produced");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts).await?;
        ensure!(vectors.len() == chunks.len(), "embedder returned {} vectors for {} chunks", vectors.len(), chunks.len());
        self.dense.add(&vectors, &chunks).await?;

        let corpus = self.dense.metadata().await?;
        self.lexical.build(&corpus)?;
        info!(path = %path.display(), chunks = chunks.len(), corpus = corpus.len(), "ingested file");
        Ok(chunks.len())
    }

    /// Ingest each path in turn; a failing file is recorded and the batch continues.
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> IngestReport {
        self.ingest_files_with(paths, |_| {}).await
    }

    /// [`Self::ingest_files`], calling `on_file` as each file's outcome is known.
    pub async fn ingest_files_with(&self, paths: &[PathBuf], mut on_file: impl FnMut(&FileOutcome)) -> IngestReport {
        let mut report = IngestReport::default();
        for path in paths {
            let outcome = match self.ingest_file(path).await {
                Ok(n) => FileOutcome { path: path.clone(), chunks: Some(n), error: None },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ingestion failed");
                    FileOutcome { path: path.clone(), chunks: None, error: Some(format!("{e:#}")) }
                }
            };
            on_file(&outcome);
            report.files.push(outcome);
        }
        info!(files = paths.len(), chunks = report.total_chunks(), "ingest complete");
        report
    }

    pub fn query_lexical(&self, q: &str, k: usize) -> Result<Vec<CandidateResult>> { self.lexical.query(q, k) }

    pub async fn query_dense(&self, q: &str, k: usize) -> Result<Vec<CandidateResult>> {
        if self.dense.len().await? == 0 { return Ok(Vec::new()); }
        let qvec = self.embedder.embed_query(q).await?;
        self.dense.search(&qvec, k).await
    }

    /// Lexical first; dense only when the lexical side has nothing.
    pub async fn quick(&self, q: &str, top_k: usize) -> Result<SearchResponse> {
        let lexical = self.query_lexical(q, top_k)?;
        if !lexical.is_empty() {
            return Ok(SearchResponse { source: SearchSource::Lexical, results: lexical });
        }
        debug!(q, "no lexical hits, falling back to dense");
        Ok(SearchResponse { source: SearchSource::Dense, results: self.query_dense(q, top_k).await? })
    }

    pub async fn deep(&self, q: &str, faiss_k: usize, rerank_k: usize) -> Result<SearchResponse> {
        self.deep_with_alpha(q, faiss_k, rerank_k, self.alpha).await
    }

    /// Dense recall of `faiss_k` candidates, BM25 over exactly those
    /// candidates, fused and cut to `rerank_k`.
    pub async fn deep_with_alpha(&self, q: &str, faiss_k: usize, rerank_k: usize, alpha: f32) -> Result<SearchResponse> {
        let candidates = self.query_dense(q, faiss_k).await?;
        if candidates.is_empty() {
            return Ok(SearchResponse { source: SearchSource::Hybrid, results: Vec::new() });
        }
        let subset: Vec<_> = candidates.iter().map(CandidateResult::to_chunk).collect();
        let lexical = L::from_corpus(&subset)?.query(q, subset.len())?;
        let results = fuse(&candidates, &lexical, alpha, rerank_k);
        debug!(q, candidates = candidates.len(), lexical = lexical.len(), returned = results.len(), "deep query");
        Ok(SearchResponse { source: SearchSource::Hybrid, results })
    }

    /// Dense artifacts into `dir`, lexical corpus into `dir/bm25.json`.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        self.dense.save(dir).await?;
        self.lexical.save(&dir.join(LEXICAL_FILE))?;
        info!(dir = %dir.display(), "indexes saved");
        Ok(())
    }

    /// Restore both indexes. Nothing is touched unless every artifact exists.
    pub async fn load(&self, dir: &Path) -> Result<()> {
        let mut required = self.dense.artifacts(dir);
        required.push(dir.join(LEXICAL_FILE));
        if let Some(missing) = required.into_iter().find(|p| !p.exists()) {
            return Err(Error::PersistenceMissing(missing).into());
        }
        self.dense.load(dir).await?;
        self.lexical.load(&dir.join(LEXICAL_FILE))?;
        info!(dir = %dir.display(), "indexes loaded");
        Ok(())
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        Ok(IndexStatus {
            dense_vectors: self.dense.len().await?,
            lexical_corpus: self.lexical.len(),
            embed_provider: self.embedder.provider().to_string(),
        })
    }
}
