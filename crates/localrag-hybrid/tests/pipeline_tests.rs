use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use localrag_cache::MemoryCache;
use localrag_core::traits::LexicalIndex;
use localrag_core::types::{CandidateResult, Chunk, SearchSource};
use localrag_core::{ChunkParams, Error};
use localrag_embed::HashedEmbedder;
use localrag_hybrid::{FlatPipeline, RagPipeline, SearchService, LEXICAL_FILE};
use localrag_text::Bm25Index;
use localrag_vector::FlatIndex;

/// One heading section per chunk once merging is disabled.
fn sectioned_text(n: usize) -> String {
    (0..n)
        .map(|i| format!("SECTION {i}\nchunk{i} shared words about topic{i} and more filler text here."))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn no_merge() -> ChunkParams { ChunkParams::default().with_min_words(0) }

fn pipeline() -> FlatPipeline {
    RagPipeline::new(Box::new(HashedEmbedder::new(64)), FlatIndex::new(), Bm25Index::new()).with_params(no_merge())
}

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

fn contents(rs: &[CandidateResult]) -> Vec<&str> { rs.iter().map(|r| r.content.as_str()).collect() }

async fn ten_chunk_pipeline(dir: &Path) -> FlatPipeline {
    let p = pipeline();
    let n = p.ingest_file(&write(dir, "manual.txt", &sectioned_text(10))).await.unwrap();
    assert_eq!(n, 10);
    p
}

#[tokio::test]
async fn ingest_indexes_both_sides() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;
    let status = p.status().await.unwrap();
    assert_eq!(status.dense_vectors, 10);
    assert_eq!(status.lexical_corpus, 10);
    assert_eq!(status.embed_provider, "hashed");

    // a second file extends the lexical corpus rather than replacing it
    p.ingest_file(&write(dir.path(), "extra.txt", "NOTES\nbattery storage tips")).await.unwrap();
    assert_eq!(p.lexical().len(), 11);
}

#[tokio::test]
async fn deep_results_are_bounded_by_corpus_not_faiss_k() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;

    let resp = p.deep("topic3 shared", 500, 10).await.unwrap();
    assert_eq!(resp.source, SearchSource::Hybrid);
    assert!(resp.results.len() <= 10);
    assert_eq!(p.deep("topic3 shared", 500, 3).await.unwrap().results.len(), 3);
    for pair in resp.results.windows(2) { assert!(pair[0].score >= pair[1].score); }
}

#[tokio::test]
async fn alpha_one_is_dense_order_and_alpha_zero_favours_lexical() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;

    let dense = p.query_dense("topic7 filler", 500).await.unwrap();
    let fused = p.deep_with_alpha("topic7 filler", 500, 500, 1.0).await.unwrap().results;
    assert_eq!(contents(&fused), contents(&dense));

    let lexical_only = p.deep_with_alpha("topic7", 500, 500, 0.0).await.unwrap().results;
    assert!(lexical_only[0].content.contains("topic7"));
    assert!(lexical_only[1..].iter().all(|r| r.score == 0.0));
}

#[tokio::test]
async fn quick_prefers_lexical_and_falls_back_to_dense() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;

    let lexical = p.quick("chunk4", 5).await.unwrap();
    assert_eq!(lexical.source, SearchSource::Lexical);
    assert_eq!(lexical.results.len(), 1);
    assert_eq!(lexical.results[0].heading, "SECTION 4");

    let dense = p.quick("unmatchedterm", 5).await.unwrap();
    assert_eq!(dense.source, SearchSource::Dense);
    assert_eq!(dense.results.len(), 5);
}

#[tokio::test]
async fn empty_corpus_answers_with_empty_results() {
    let p = pipeline();
    let quick = p.quick("anything", 5).await.unwrap();
    assert_eq!(quick.source, SearchSource::Dense);
    assert!(quick.results.is_empty());
    let deep = p.deep("anything", 500, 10).await.unwrap();
    assert_eq!(deep.source, SearchSource::Hybrid);
    assert!(deep.results.is_empty());
}

#[tokio::test]
async fn batch_ingest_continues_past_bad_files() {
    let dir = TempDir::new().unwrap();
    let p = pipeline();
    let paths = vec![
        write(dir.path(), "table.csv", "a,b\n1,2"),
        write(dir.path(), "notes.txt", &sectioned_text(2)),
        write(dir.path(), "broken.docx", "not a zip"),
    ];
    let report = p.ingest_files(&paths).await;
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.total_chunks(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].error.as_deref().unwrap_or_default().contains("Unsupported file type: csv"));
    assert!(failures[1].error.as_deref().unwrap_or_default().contains("broken.docx"));
}

#[tokio::test]
async fn batch_ingest_reports_each_file_as_it_finishes() {
    let dir = TempDir::new().unwrap();
    let p = pipeline();
    let paths = vec![
        write(dir.path(), "notes.txt", &sectioned_text(3)),
        write(dir.path(), "table.csv", "a,b\n1,2"),
        write(dir.path(), "more.txt", &sectioned_text(1)),
    ];
    let mut seen = Vec::new();
    let report = p.ingest_files_with(&paths, |outcome| seen.push((outcome.path.clone(), outcome.chunks))).await;

    assert_eq!(seen, vec![(paths[0].clone(), Some(3)), (paths[1].clone(), None), (paths[2].clone(), Some(1))]);
    let from_report: Vec<_> = report.files.iter().map(|f| (f.path.clone(), f.chunks)).collect();
    assert_eq!(seen, from_report);
    assert_eq!(p.lexical().len(), 4);
}

#[tokio::test]
async fn quick_with_huge_k_returns_every_match() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;
    let resp = p.quick("shared", usize::MAX).await.unwrap();
    assert_eq!(resp.source, SearchSource::Lexical);
    assert_eq!(resp.results.len(), 10);
}

#[tokio::test]
async fn save_then_load_restores_both_indexes() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("vector_store");
    let p = ten_chunk_pipeline(dir.path()).await;
    p.save(&store).await.unwrap();
    assert!(store.join(LEXICAL_FILE).exists());

    let restored = pipeline();
    restored.load(&store).await.unwrap();
    assert_eq!(restored.status().await.unwrap(), p.status().await.unwrap());
    assert_eq!(restored.quick("chunk2", 3).await.unwrap(), p.quick("chunk2", 3).await.unwrap());
}

#[tokio::test]
async fn load_without_save_is_persistence_missing() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;
    let empty = dir.path().join("nothing_here");

    let err = p.load(&empty).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::PersistenceMissing(_))));
    assert_eq!(p.status().await.unwrap().dense_vectors, 10, "in-memory state untouched");
}

/// Bm25Index that counts queries and is slow enough for callers to overlap.
struct CountingLexical {
    inner: Bm25Index,
    queries: AtomicUsize,
}

impl LexicalIndex for CountingLexical {
    fn from_corpus(corpus: &[Chunk]) -> anyhow::Result<Self> {
        Ok(Self { inner: Bm25Index::from_corpus(corpus)?, queries: AtomicUsize::new(0) })
    }
    fn build(&self, corpus: &[Chunk]) -> anyhow::Result<()> { self.inner.build(corpus) }
    fn query(&self, text: &str, k: usize) -> anyhow::Result<Vec<CandidateResult>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        self.inner.query(text, k)
    }
    fn len(&self) -> usize { self.inner.len() }
    fn save(&self, path: &Path) -> anyhow::Result<()> { self.inner.save(path) }
    fn load(&self, path: &Path) -> anyhow::Result<()> { self.inner.load(path) }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_identical_quick_searches_compute_once() {
    let dir = TempDir::new().unwrap();
    let counting = CountingLexical::from_corpus(&[]).unwrap();
    let p = RagPipeline::new(Box::new(HashedEmbedder::new(64)), FlatIndex::new(), counting).with_params(no_merge());
    p.ingest_file(&write(dir.path(), "manual.txt", &sectioned_text(10))).await.unwrap();

    let service = Arc::new(SearchService::new(Arc::new(p), Arc::new(MemoryCache::new())));
    let (a, b) = {
        let (s1, s2) = (service.clone(), service.clone());
        tokio::join!(
            tokio::spawn(async move { s1.quick_search("chunk5", 5).await }),
            tokio::spawn(async move { s2.quick_search("chunk5", 5).await }),
        )
    };
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());

    assert_eq!(a, b);
    assert_eq!(a.source, SearchSource::Lexical);
    assert_eq!(service.pipeline().lexical().queries.load(Ordering::SeqCst), 1);

    // later identical calls are served from cache
    service.quick_search("chunk5", 5).await.unwrap();
    assert_eq!(service.pipeline().lexical().queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deep_search_is_cached_per_parameters() {
    let dir = TempDir::new().unwrap();
    let p = ten_chunk_pipeline(dir.path()).await;
    let service = SearchService::new(Arc::new(p), Arc::new(MemoryCache::new()));
    let first = service.deep_search("topic1", 500, 10).await.unwrap();
    let again = service.deep_search("topic1", 500, 10).await.unwrap();
    assert_eq!(first, again);
    assert_eq!(service.deep_search("topic1", 500, 2).await.unwrap().results.len(), 2);
}
