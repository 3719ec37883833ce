//! Domain types shared by the adapters, the chunk builder and the retrieval engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_HEADING: &str = "Document";

/// Structural role of a block. Only `Text` blocks are ever subdivided.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    #[default]
    Text,
    Table,
    List,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Table => "table",
            Self::List => "list",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "table" => Self::Table,
            "list" => Self::List,
            _ => Self::Text,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

fn default_heading() -> String { DEFAULT_HEADING.to_string() }

/// A raw structural unit extracted from a document.
///
/// Missing fields default when deserialized: `heading = "Document"`,
/// `content = ""`, `kind = text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    #[serde(default = "default_heading")]
    pub heading: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: BlockKind,
}

impl Block {
    pub fn new(heading: impl Into<String>, content: impl Into<String>, kind: BlockKind) -> Self {
        Self { heading: heading.into(), content: content.into(), kind }
    }

    pub fn text(heading: impl Into<String>, content: impl Into<String>) -> Self { Self::new(heading, content, BlockKind::Text) }

    pub fn table(heading: impl Into<String>, content: impl Into<String>) -> Self { Self::new(heading, content, BlockKind::Table) }

    pub fn word_count(&self) -> usize { self.content.split_whitespace().count() }
}

impl Default for Block {
    fn default() -> Self { Self::text(DEFAULT_HEADING, "") }
}

/// Chunks are block-shaped; the distinction is that a chunk is bounded and indexed.
pub type Chunk = Block;

/// One retrieved chunk with an engine-specific score (higher is better).
///
/// Dense scores are bounded similarities, lexical scores are unbounded BM25
/// values. The two are only ever combined through fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateResult {
    pub heading: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub score: f32,
}

impl CandidateResult {
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self { heading: chunk.heading.clone(), content: chunk.content.clone(), kind: chunk.kind, score }
    }

    pub fn to_chunk(&self) -> Chunk { Chunk::new(self.heading.clone(), self.content.clone(), self.kind) }
}

/// Indicates which strategy produced a response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Lexical,
    Dense,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    pub source: SearchSource,
    pub results: Vec<CandidateResult>,
}

/// Corpus sizes and the embedding provider in use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStatus {
    pub dense_vectors: usize,
    pub lexical_corpus: usize,
    pub embed_provider: String,
}

/// Per-file outcome of a batch ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub chunks: Option<usize>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize { self.files.iter().filter_map(|f| f.chunks).sum() }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> { self.files.iter().filter(|f| f.error.is_some()) }
}
