//! localrag-text
//!
//! Lexical collaborator: BM25 term scoring over chunk text, backed by an
//! in-RAM tantivy index that is rebuilt from the chunk corpus.
pub mod bm25;
pub mod tantivy_utils;

pub use bm25::Bm25Index;
