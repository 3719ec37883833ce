use anyhow::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use localrag_core::types::Block;

use crate::{FormatAdapter, LEADING_HEADING};

static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{5,}").expect("rule pattern"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z0-9 ._-]{4,29}$").expect("heading pattern"));

const MAX_HEADING_WORDS: usize = 10;

/// Plain text: uppercase or numbered short lines start a section, blank lines
/// close a paragraph.
#[derive(Debug, Clone, Default)]
pub struct TextAdapter;

impl TextAdapter {
    fn read_file_content(path: &Path) -> Result<String> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
        }
    }
}

impl FormatAdapter for TextAdapter {
    fn extract(&self, path: &Path) -> Result<Vec<Block>> { Ok(detect_sections(&Self::read_file_content(path)?)) }
}

pub fn is_heading(line: &str) -> bool {
    HEADING.is_match(line) && line.split_whitespace().count() < MAX_HEADING_WORDS
}

/// Split raw text into heading-scoped paragraphs.
pub fn detect_sections(text: &str) -> Vec<Block> {
    let mut sections = Vec::new();
    let mut heading = LEADING_HEADING.to_string();
    let mut buffer: Vec<String> = Vec::new();

    let flush = |buffer: &mut Vec<String>, heading: &str, sections: &mut Vec<Block>| {
        if buffer.is_empty() { return; }
        let content = buffer.join("\n").trim().to_string();
        buffer.clear();
        if !content.is_empty() { sections.push(Block::text(heading, content)); }
    };

    for line in text.lines() {
        let line = RULE.replace_all(line.trim(), "");
        let line = line.trim();
        if is_heading(line) {
            flush(&mut buffer, &heading, &mut sections);
            heading = line.to_string();
        } else if line.is_empty() {
            flush(&mut buffer, &heading, &mut sections);
        } else {
            buffer.push(line.to_string());
        }
    }
    flush(&mut buffer, &heading, &mut sections);
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_rules() {
        assert!(is_heading("INTRO"));
        assert!(is_heading("1.2 SCOPE"));
        assert!(!is_heading("ABC"));
        assert!(!is_heading("Introduction"));
        assert!(!is_heading("A VERY LONG UPPERCASE LINE THAT IS OVER LIMIT"));
    }

    #[test]
    fn rules_are_stripped_before_matching() {
        let blocks = detect_sections("SUMMARY\n----------\nbody text");
        assert_eq!(blocks, vec![Block::text("SUMMARY", "body text")]);
    }
}
