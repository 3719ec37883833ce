use anyhow::{anyhow, Result};
use std::fs;
use std::path::Path;
use std::sync::RwLock;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, TantivyDocument, Term};
use tracing::{debug, info};

use localrag_core::traits::LexicalIndex;
use localrag_core::types::{CandidateResult, Chunk};
use localrag_core::Error;

use crate::tantivy_utils::{build_schema, register_tokenizer, ORD_FIELD, TEXT_FIELD};

/// Minimum per-thread arena tantivy accepts for a writer.
const WRITER_HEAP_BYTES: usize = 15_000_000;

struct IndexState {
	corpus: Vec<Chunk>,
	reader: IndexReader,
	text_field: Field,
	ord_field: Field,
}

impl IndexState {
	fn create(corpus: Vec<Chunk>) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let text_field = schema.get_field(TEXT_FIELD)?;
		let ord_field = schema.get_field(ORD_FIELD)?;

		let mut index_writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		for (i, c) in corpus.iter().enumerate() {
			index_writer.add_document(doc!(text_field => c.content.clone(), ord_field => i as u64))?;
		}
		index_writer.commit()?;
		let reader = index.reader()?;
		Ok(Self { corpus, reader, text_field, ord_field })
	}

	fn query(&self, text: &str, k: usize) -> Result<Vec<CandidateResult>> {
		let clauses: Vec<(Occur, Box<dyn Query>)> = text
			.split_whitespace()
			.map(|tok| {
				let term = Term::from_field_text(self.text_field, tok);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		if clauses.is_empty() { return Ok(Vec::new()); }

		let searcher = self.reader.searcher();
		// the collector preallocates from its limit
		let limit = k.min(self.corpus.len());
		let top_docs = searcher.search(&BooleanQuery::new(clauses), &TopDocs::with_limit(limit))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let ord = doc.get_first(self.ord_field).and_then(|v| v.as_u64()).ok_or_else(|| anyhow!("indexed document without ord"))?;
			let chunk = self.corpus.get(ord as usize).ok_or_else(|| anyhow!("ord {ord} outside corpus"))?;
			hits.push(CandidateResult::from_chunk(chunk, score));
		}
		Ok(hits)
	}
}

/// BM25 over raw whitespace tokens, rebuilt in RAM on every `build`.
#[derive(Default)]
pub struct Bm25Index {
	state: RwLock<Option<IndexState>>,
}

impl Bm25Index {
	pub fn new() -> Self { Self::default() }

	/// Snapshot of the indexed chunks.
	pub fn corpus(&self) -> Result<Vec<Chunk>> {
		let guard = self.state.read().map_err(|_| anyhow!("lexical index lock poisoned"))?;
		Ok(guard.as_ref().map(|s| s.corpus.clone()).unwrap_or_default())
	}
}

impl LexicalIndex for Bm25Index {
	fn from_corpus(corpus: &[Chunk]) -> Result<Self> {
		let index = Self::new();
		index.build(corpus)?;
		Ok(index)
	}

	fn build(&self, corpus: &[Chunk]) -> Result<()> {
		let state = if corpus.is_empty() { None } else { Some(IndexState::create(corpus.to_vec())?) };
		*self.state.write().map_err(|_| anyhow!("lexical index lock poisoned"))? = state;
		debug!(docs = corpus.len(), "lexical index built");
		Ok(())
	}

	fn query(&self, text: &str, k: usize) -> Result<Vec<CandidateResult>> {
		// TopDocs rejects a zero limit
		if k == 0 { return Ok(Vec::new()); }
		let guard = self.state.read().map_err(|_| anyhow!("lexical index lock poisoned"))?;
		match guard.as_ref() {
			Some(state) => state.query(text, k),
			None => Ok(Vec::new()),
		}
	}

	fn len(&self) -> usize {
		self.state.read().map(|g| g.as_ref().map_or(0, |s| s.corpus.len())).unwrap_or(0)
	}

	fn save(&self, path: &Path) -> Result<()> {
		let corpus = self.corpus()?;
		if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
		fs::write(path, serde_json::to_vec(&corpus)?)?;
		info!(path = %path.display(), docs = corpus.len(), "lexical corpus saved");
		Ok(())
	}

	fn load(&self, path: &Path) -> Result<()> {
		if !path.exists() { return Err(Error::PersistenceMissing(path.to_path_buf()).into()); }
		let corpus: Vec<Chunk> = serde_json::from_slice(&fs::read(path)?)?;
		self.build(&corpus)?;
		info!(path = %path.display(), docs = corpus.len(), "lexical corpus loaded");
		Ok(())
	}
}
