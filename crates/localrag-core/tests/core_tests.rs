use localrag_core::chunker::{chunk_block, merge_small_chunks, unified_chunk, ChunkParams};
use localrag_core::config::Config;
use localrag_core::types::{Block, BlockKind};

fn numbered_sentences(n: usize) -> String {
    // ten words per sentence
    (0..n).map(|i| format!("s{i} alpha beta gamma delta epsilon zeta eta theta iota.")).collect::<Vec<_>>().join(" ")
}

fn words(s: &str) -> usize { s.split_whitespace().count() }

#[test]
fn empty_input_yields_no_chunks() {
    assert!(unified_chunk(&[], &ChunkParams::default()).is_empty());
    let blank = Block::text("Intro", "   ");
    assert!(unified_chunk(&[blank], &ChunkParams::default()).is_empty());
}

#[test]
fn four_hundred_words_make_three_chunks_with_carryover() {
    let block = Block::text("Body", numbered_sentences(40));
    assert_eq!(block.word_count(), 400);

    let chunks = unified_chunk(&[block], &ChunkParams::new(150, 50));
    assert_eq!(chunks.len(), 3);
    assert!(words(&chunks[0].content) <= 150);
    // 50 / 15 = 3 sentences carried from the previous chunk's tail
    assert!(chunks[1].content.starts_with("s12 "), "second chunk: {}", &chunks[1].content[..40]);
    assert!(chunks[2].content.starts_with("s24 "), "third chunk: {}", &chunks[2].content[..40]);
}

#[test]
fn text_chunks_stay_within_max_words_before_merging() {
    let params = ChunkParams::new(60, 30);
    let block = Block::text("Body", numbered_sentences(25));
    let carry_words = (params.overlap / 15) * 10;
    for chunk in chunk_block(&block, &params) {
        assert!(words(&chunk.content) <= params.max_words + carry_words);
    }
}

#[test]
fn tables_and_lists_are_never_split() {
    let long_table = format!("| a | b |\n| --- | --- |\n{}", "| x | y |\n".repeat(200));
    let blocks = vec![
        Block::table("Specs", long_table.clone()),
        Block::new("Steps", "one two three", BlockKind::List),
    ];
    let chunks = unified_chunk(&blocks, &ChunkParams::new(10, 0).with_min_words(0));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, long_table);
    assert_eq!(chunks[0].kind, BlockKind::Table);
    assert_eq!(chunks[1].kind, BlockKind::List);
}

#[test]
fn first_chunk_survives_merge_and_words_are_conserved() {
    let raw = vec![Block::text("A", "tiny"), Block::text("B", "also small"), Block::text("C", numbered_sentences(6))];
    let before: usize = raw.iter().map(Block::word_count).sum();
    let merged = merge_small_chunks(raw, 50);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].heading, "A");
    assert_eq!(merged[0].content, "tiny also small");
    let after: usize = merged.iter().map(Block::word_count).sum();
    assert_eq!(before, after);
}

#[test]
fn chunking_is_deterministic() {
    let blocks = vec![Block::text("A", numbered_sentences(33)), Block::table("T", "| a |"), Block::text("", "short tail.")];
    let params = ChunkParams::default();
    assert_eq!(unified_chunk(&blocks, &params), unified_chunk(&blocks, &params));
}

#[test]
fn missing_fields_default_on_deserialize() {
    let block: Block = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
    assert_eq!(block.heading, "Document");
    assert_eq!(block.kind, BlockKind::Text);

    let chunks = unified_chunk(&[Block::text("", "hello there.")], &ChunkParams::default());
    assert_eq!(chunks[0].heading, "Document");
}

#[test]
fn settings_defaults_and_overrides() {
    use figment::providers::{Format, Toml};
    use figment::Figment;

    let config = Config::from_figment(Figment::from(Toml::string("[chunking]\nmax_words = 200\n[search]\nalpha = 0.25\n"))).unwrap();
    let settings = config.settings().unwrap();
    assert_eq!(settings.chunking.max_words, 200);
    assert_eq!(settings.chunking.overlap, 50);
    assert!((settings.search.alpha - 0.25).abs() < f32::EPSILON);
    assert_eq!(settings.cache.quick_ttl_secs, 60);
    assert_eq!(config.get::<usize>("search.rerank_k").unwrap(), 10);
}

#[test]
fn settings_reject_out_of_range_alpha() {
    use figment::providers::{Format, Toml};
    use figment::Figment;

    let err = Config::from_figment(Figment::from(Toml::string("[search]\nalpha = 1.5\n"))).err().expect("invalid alpha");
    assert!(err.to_string().contains("alpha"));
}
