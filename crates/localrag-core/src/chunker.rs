//! Unified chunk builder.
//!
//! Every adapter feeds the same three steps: normalize blocks, split text
//! blocks into bounded sentence windows with sentence-level overlap, then
//! fold undersized chunks into their predecessor. Table and list blocks pass
//! through untouched.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Block, BlockKind, Chunk, DEFAULT_HEADING};

/// Average sentence length assumed when converting a word overlap into sentences.
const WORDS_PER_SENTENCE: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkParams {
    pub max_words: usize,
    /// Approximate overlap in words; carried over as `overlap / 15` whole sentences.
    pub overlap: usize,
    pub min_words: usize,
}

impl Default for ChunkParams {
    fn default() -> Self { Self { max_words: 150, overlap: 50, min_words: 50 } }
}

impl ChunkParams {
    pub fn new(max_words: usize, overlap: usize) -> Self { Self { max_words, overlap, ..Self::default() } }

    pub fn with_min_words(mut self, min_words: usize) -> Self { self.min_words = min_words; self }

    fn carry_sentences(&self) -> usize { self.overlap / WORDS_PER_SENTENCE }
}

fn word_count(text: &str) -> usize { text.split_whitespace().count() }

/// Fill in defaults for blocks whose heading was left empty.
pub fn normalize_blocks(blocks: &[Block]) -> Vec<Block> {
    blocks
        .iter()
        .map(|b| {
            let heading = if b.heading.trim().is_empty() { DEFAULT_HEADING.to_string() } else { b.heading.clone() };
            Block::new(heading, b.content.clone(), b.kind)
        })
        .collect()
}

/// Split on whitespace that directly follows `.`, `!` or `?`, keeping the punctuation.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let text = text.trim();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') { continue; }
        let Some(&(_, next)) = chars.peek() else { break };
        if !next.is_whitespace() { continue; }
        let end = i + c.len_utf8();
        sentences.push(&text[start..end]);
        while let Some(&(_, ws)) = chars.peek() {
            if !ws.is_whitespace() { break; }
            chars.next();
        }
        start = chars.peek().map_or(text.len(), |&(j, _)| j);
    }
    if start < text.len() { sentences.push(&text[start..]); }
    sentences.retain(|s| !s.trim().is_empty());
    sentences
}

/// Chunk a single block. Non-text blocks come back as one unmodified chunk.
pub fn chunk_block(block: &Block, params: &ChunkParams) -> Vec<Chunk> {
    if block.kind != BlockKind::Text { return vec![block.clone()]; }

    let emit = |sentences: &[&str]| Chunk::new(block.heading.clone(), sentences.join(" "), block.kind);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;

    for sentence in split_sentences(&block.content) {
        let words = word_count(sentence);
        if current_words + words <= params.max_words || current.is_empty() {
            current.push(sentence);
            current_words += words;
            continue;
        }
        chunks.push(emit(&current));
        let keep = params.carry_sentences().min(current.len());
        current = current.split_off(current.len() - keep);
        current.push(sentence);
        current_words = current.iter().map(|s| word_count(s)).sum();
    }
    if !current.is_empty() { chunks.push(emit(&current)); }
    chunks
}

/// Absorb chunks below `min_words` into the chunk before them. The first chunk has
/// no predecessor and always survives.
pub fn merge_small_chunks(chunks: Vec<Chunk>, min_words: usize) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(prev) if chunk.word_count() < min_words => {
                prev.content.push(' ');
                prev.content.push_str(&chunk.content);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

/// Normalize, split and merge `blocks` into index-ready chunks.
pub fn unified_chunk(blocks: &[Block], params: &ChunkParams) -> Vec<Chunk> {
    let normalized = normalize_blocks(blocks);
    let raw: Vec<Chunk> = normalized.iter().flat_map(|b| chunk_block(b, params)).collect();
    let raw_len = raw.len();
    let merged = merge_small_chunks(raw, params.min_words);
    debug!(blocks = blocks.len(), raw = raw_len, merged = merged.len(), "chunked blocks");
    merged
}
