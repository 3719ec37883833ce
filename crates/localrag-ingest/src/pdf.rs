use anyhow::{anyhow, Result};
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

use localrag_core::types::Block;

use crate::markdown::table_to_markdown;
use crate::{FormatAdapter, LEADING_HEADING};

/// A block whose font is this much larger than the document average is a heading.
const HEADING_FONT_RATIO: f64 = 1.2;
/// Lines whose font sizes differ by more than this belong to different blocks.
const SIZE_TOLERANCE: f64 = 0.5;

static COLUMN_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("gap pattern"));

/// PDF: font-size driven headings plus heuristic table detection. Text runs
/// are re-split into fixed sliding word windows; tables follow all text.
#[derive(Debug, Clone)]
pub struct PdfAdapter {
    pub max_words: usize,
    pub overlap: usize,
}

impl Default for PdfAdapter {
    fn default() -> Self { Self { max_words: 150, overlap: 50 } }
}

impl PdfAdapter {
    pub fn new(max_words: usize, overlap: usize) -> Self { Self { max_words, overlap } }
}

impl FormatAdapter for PdfAdapter {
    fn extract(&self, path: &Path) -> Result<Vec<Block>> {
        let bytes = fs::read(path)?;
        info!(path = %path.display(), "pdf extraction started");
        let (text_blocks, tables) = rayon::join(|| extract_text_blocks(&bytes), || extract_tables(&bytes));
        let (text_blocks, tables) = (text_blocks?, tables?);
        info!(text_blocks = text_blocks.len(), tables = tables.len(), "pdf extraction finished");
        Ok(assemble_blocks(&text_blocks, tables, self.max_words, self.overlap))
    }
}

/// A run of consecutive lines sharing one font size.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub page: u32,
    pub text: String,
    pub font_size: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

#[derive(Default)]
struct BlockCollector {
    page: u32,
    blocks: Vec<TextBlock>,
    line: String,
    line_sizes: Vec<f64>,
    block_lines: Vec<String>,
    block_sizes: Vec<f64>,
}

impl BlockCollector {
    fn finish_line(&mut self) {
        let text = self.line.split_whitespace().collect::<Vec<_>>().join(" ");
        self.line.clear();
        let sizes = std::mem::take(&mut self.line_sizes);
        if text.is_empty() { return; }
        let size = mean(&sizes);
        if !self.block_lines.is_empty() && (size - mean(&self.block_sizes)).abs() > SIZE_TOLERANCE {
            self.flush_block();
        }
        self.block_lines.push(text);
        self.block_sizes.extend(sizes);
    }

    fn flush_block(&mut self) {
        if self.block_lines.is_empty() { return; }
        let text = self.block_lines.join(" ");
        let font_size = mean(&self.block_sizes);
        self.block_lines.clear();
        self.block_sizes.clear();
        self.blocks.push(TextBlock { page: self.page, text, font_size });
    }

    fn finish(mut self) -> Vec<TextBlock> {
        self.finish_line();
        self.flush_block();
        self.blocks
    }
}

impl OutputDev for BlockCollector {
    fn begin_page(&mut self, page_num: u32, _media_box: &MediaBox, _art_box: Option<(f64, f64, f64, f64)>) -> Result<(), OutputError> {
        self.page = page_num;
        Ok(())
    }

    fn end_page(&mut self) -> Result<(), OutputError> {
        self.finish_line();
        self.flush_block();
        Ok(())
    }

    fn output_character(&mut self, trm: &Transform, _width: f64, _spacing: f64, font_size: f64, char: &str) -> Result<(), OutputError> {
        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        self.line.push_str(char);
        self.line_sizes.push(if scale > 0.0 { font_size * scale } else { font_size });
        Ok(())
    }

    fn begin_word(&mut self) -> Result<(), OutputError> { Ok(()) }

    fn end_word(&mut self) -> Result<(), OutputError> { Ok(()) }

    fn end_line(&mut self) -> Result<(), OutputError> {
        self.finish_line();
        Ok(())
    }
}

/// Text blocks in reading order, each with its average rendered font size.
pub fn extract_text_blocks(bytes: &[u8]) -> Result<Vec<TextBlock>> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let mut collector = BlockCollector::default();
    pdf_extract::output_doc(&doc, &mut collector).map_err(|e| anyhow!("PDF text extraction failed: {e:?}"))?;
    let blocks = collector.finish();
    debug!(blocks = blocks.len(), "collected pdf text blocks");
    Ok(blocks)
}

/// Tables detected in the plain-text rendering, one `table` block per run.
pub fn extract_tables(bytes: &[u8]) -> Result<Vec<Block>> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("PDF table extraction failed: {e:?}"))?;
    let mut tables = Vec::new();
    for (i, page) in text.split('\x0C').enumerate() {
        for rows in detect_table_rows(page) {
            let md = table_to_markdown(&rows);
            if !md.is_empty() { tables.push(Block::table(format!("Table (Page {})", i + 1), md)); }
        }
    }
    Ok(tables)
}

/// Runs of two or more consecutive lines that split into the same number (>= 2)
/// of columns on wide whitespace gaps.
pub fn detect_table_rows(page: &str) -> Vec<Vec<Vec<String>>> {
    let mut tables = Vec::new();
    let mut run: Vec<Vec<String>> = Vec::new();
    let close = |run: &mut Vec<Vec<String>>, tables: &mut Vec<Vec<Vec<String>>>| {
        if run.len() >= 2 { tables.push(std::mem::take(run)); } else { run.clear(); }
    };
    for line in page.lines() {
        let cells: Vec<String> = COLUMN_GAP.split(line.trim()).filter(|c| !c.is_empty()).map(str::to_string).collect();
        if cells.len() < 2 {
            close(&mut run, &mut tables);
            continue;
        }
        if run.first().is_some_and(|r| r.len() != cells.len()) { close(&mut run, &mut tables); }
        run.push(cells);
    }
    close(&mut run, &mut tables);
    tables
}

/// Fixed windows of `max_words` words advancing by `max_words - overlap`.
pub fn sliding_windows(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let size = max_words.max(1);
    let step = size.saturating_sub(overlap).max(1);
    (0..words.len()).step_by(step).map(|i| words[i..(i + size).min(words.len())].join(" ")).collect()
}

/// Group text blocks under font-detected headings, window each run, then append tables.
pub fn assemble_blocks(text_blocks: &[TextBlock], tables: Vec<Block>, max_words: usize, overlap: usize) -> Vec<Block> {
    let mut out = Vec::new();
    let sizes: Vec<f64> = text_blocks.iter().map(|b| b.font_size).collect();
    let avg_font = mean(&sizes);
    let mut heading = LEADING_HEADING.to_string();
    let mut buffer: Vec<&str> = Vec::new();

    let mut push_run = |heading: &str, buffer: &mut Vec<&str>| {
        let text = buffer.join(" ");
        buffer.clear();
        out.extend(sliding_windows(text.trim(), max_words, overlap).into_iter().map(|w| Block::text(heading, w)));
    };

    for blk in text_blocks {
        if blk.font_size > avg_font * HEADING_FONT_RATIO {
            push_run(&heading, &mut buffer);
            heading = blk.text.clone();
        } else {
            buffer.push(&blk.text);
        }
    }
    push_run(&heading, &mut buffer);

    out.extend(tables);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb(text: &str, font_size: f64) -> TextBlock { TextBlock { page: 1, text: text.to_string(), font_size } }

    #[test]
    fn windows_advance_by_stride() {
        let text = (0..250).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let windows = sliding_windows(&text, 150, 50);
        assert_eq!(windows.len(), 3);
        assert!(windows[1].starts_with("w100 "));
        assert_eq!(windows[2].split_whitespace().count(), 50);
    }

    #[test]
    fn large_font_starts_a_section_and_tables_come_last() {
        let blocks = vec![tb("preamble text", 10.0), tb("OVERVIEW", 18.0), tb("body one", 10.0), tb("body two", 10.0)];
        let tables = vec![Block::table("Table (Page 1)", "| a | b |")];
        let out = assemble_blocks(&blocks, tables, 150, 50);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], Block::text(LEADING_HEADING, "preamble text"));
        assert_eq!(out[1], Block::text("OVERVIEW", "body one body two"));
        assert_eq!(out[2].heading, "Table (Page 1)");
    }

    #[test]
    fn column_runs_become_tables() {
        let page = "Intro line\nPart    Qty    Price\nbolt    4      0.10\nnut     8      0.05\nclosing words";
        let tables = detect_table_rows(page);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][0], vec!["Part", "Qty", "Price"]);
        assert_eq!(tables[0].len(), 3);
    }
}
