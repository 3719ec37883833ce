use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED};
use tantivy::tokenizer::{TextAnalyzer, WhitespaceTokenizer};
use tantivy::Index;

pub const TOKENIZER: &str = "ws";
pub const TEXT_FIELD: &str = "content";
pub const ORD_FIELD: &str = "ord";

/// Chunk content indexed as raw whitespace tokens; `ord` points back into the corpus.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.add_u64_field(ORD_FIELD, INDEXED | STORED);
	schema_builder.build()
}

/// Case-sensitive, no stop words: terms are exactly the whitespace-split words.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(WhitespaceTokenizer::default()).build();
	index.tokenizers().register(TOKENIZER, tokenizer);
}
