use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use localrag_cache::{keys, CacheStore, QueryCoalescer};
use localrag_core::config::CacheSettings;
use localrag_core::traits::{DenseIndex, LexicalIndex};
use localrag_core::types::SearchResponse;

use crate::RagPipeline;

/// Query front door: identical concurrent searches share one pipeline call
/// and the response is cached for a short while.
pub struct SearchService<D, L>
where
    D: DenseIndex,
    L: LexicalIndex,
{
    pipeline: Arc<RagPipeline<D, L>>,
    coalescer: QueryCoalescer,
    quick_ttl: Duration,
    deep_ttl: Duration,
}

impl<D, L> SearchService<D, L>
where
    D: DenseIndex,
    L: LexicalIndex,
{
    pub fn new(pipeline: Arc<RagPipeline<D, L>>, store: Arc<dyn CacheStore>) -> Self {
        Self::from_settings(pipeline, store, &CacheSettings::default())
    }

    pub fn from_settings(pipeline: Arc<RagPipeline<D, L>>, store: Arc<dyn CacheStore>, settings: &CacheSettings) -> Self {
        Self {
            pipeline,
            coalescer: QueryCoalescer::from_settings(store, settings),
            quick_ttl: Duration::from_secs(settings.quick_ttl_secs),
            deep_ttl: Duration::from_secs(settings.deep_ttl_secs),
        }
    }

    pub fn pipeline(&self) -> &Arc<RagPipeline<D, L>> { &self.pipeline }

    pub async fn quick_search(&self, q: &str, top_k: usize) -> Result<SearchResponse> {
        let key = keys::quick(q, top_k);
        self.coalescer.get_or_compute(&key, self.quick_ttl, || self.pipeline.quick(q, top_k)).await
    }

    pub async fn deep_search(&self, q: &str, faiss_k: usize, rerank_k: usize) -> Result<SearchResponse> {
        let key = keys::deep(q, faiss_k, rerank_k);
        self.coalescer.get_or_compute(&key, self.deep_ttl, || self.pipeline.deep(q, faiss_k, rerank_k)).await
    }
}
