use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use localrag_core::types::Block;

use crate::markdown::table_to_markdown;
use crate::{FormatAdapter, LEADING_HEADING};

const DOCUMENT_PART: &str = "word/document.xml";

/// Word documents: walks `w:body` in document order. Heading-styled paragraphs
/// open a new section; tables become Markdown `table` blocks.
#[derive(Debug, Clone, Default)]
pub struct DocxAdapter;

impl FormatAdapter for DocxAdapter {
    fn extract(&self, path: &Path) -> Result<Vec<Block>> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file).context("not a DOCX (zip) container")?;
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .with_context(|| format!("missing {DOCUMENT_PART}"))?
            .read_to_string(&mut xml)?;
        parse_document_xml(&xml)
    }
}

/// `Title` and styles whose id starts with "Heading" (any case) are headings.
pub fn is_heading_style(style: &str) -> bool {
    style.eq_ignore_ascii_case("title") || style.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("heading"))
}

#[derive(Default)]
struct Paragraph {
    style: Option<String>,
    text: String,
}

#[derive(Default)]
struct TableState {
    depth: usize,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

struct SectionBuilder {
    sections: Vec<Block>,
    buffer: Vec<String>,
    heading: String,
}

impl SectionBuilder {
    fn new() -> Self { Self { sections: Vec::new(), buffer: Vec::new(), heading: LEADING_HEADING.to_string() } }

    fn flush(&mut self) {
        if self.buffer.is_empty() { return; }
        let text = self.buffer.join("\n").trim().to_string();
        self.buffer.clear();
        if !text.is_empty() { self.sections.push(Block::text(self.heading.clone(), text)); }
    }

    fn paragraph(&mut self, para: Paragraph) {
        let text = para.text.trim();
        if text.is_empty() { return; }
        if para.style.as_deref().is_some_and(is_heading_style) {
            self.flush();
            self.heading = text.to_string();
        } else {
            self.buffer.push(text.to_string());
        }
    }

    fn table(&mut self, rows: &[Vec<String>]) {
        self.flush();
        let md = table_to_markdown(rows);
        if !md.is_empty() { self.sections.push(Block::table(self.heading.clone(), md)); }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush();
        self.sections
    }
}

fn style_value(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"val" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Turn the main document part into blocks.
pub fn parse_document_xml(xml: &str) -> Result<Vec<Block>> {
    let mut reader = Reader::from_str(xml);
    let mut out = SectionBuilder::new();
    let mut table = TableState::default();
    let mut para: Option<Paragraph> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => para = Some(Paragraph::default()),
                b"t" => in_text = true,
                b"pStyle" => if let Some(p) = para.as_mut() { p.style = style_value(&e)?; },
                b"tbl" => table.depth += 1,
                b"tr" if table.depth == 1 => table.row.clear(),
                b"tc" if table.depth == 1 => table.cell.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"pStyle" => if let Some(p) = para.as_mut() { p.style = style_value(&e)?; },
                b"tab" => if let Some(p) = para.as_mut() { p.text.push('\t'); },
                b"br" => if let Some(p) = para.as_mut() { p.text.push('\n'); },
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(p) = para.as_mut() { p.text.push_str(&t.unescape()?); }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let Some(p) = para.take() else { continue };
                    if table.depth == 0 {
                        out.paragraph(p);
                    } else if !p.text.trim().is_empty() {
                        table.cell.push(p.text.trim().to_string());
                    }
                }
                b"tc" if table.depth == 1 => {
                    let cell = table.cell.join(" ");
                    table.row.push(cell);
                }
                b"tr" if table.depth == 1 => {
                    let row = std::mem::take(&mut table.row);
                    table.rows.push(row);
                }
                b"tbl" => {
                    table.depth = table.depth.saturating_sub(1);
                    if table.depth == 0 {
                        let rows = std::mem::take(&mut table.rows);
                        out.table(&rows);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    Ok(out.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_style_ids() {
        assert!(is_heading_style("Heading1"));
        assert!(is_heading_style("heading 2"));
        assert!(!is_heading_style("Normal"));
        assert!(!is_heading_style("Head"));
        assert!(is_heading_style("Title"));
        assert!(!is_heading_style("Subtitle"));
    }

    #[test]
    fn entities_in_runs_are_unescaped() {
        let xml = r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Salt &amp; pepper</w:t></w:r></w:p></w:body></w:document>"#;
        let blocks = parse_document_xml(xml).unwrap();
        assert_eq!(blocks, vec![Block::text(LEADING_HEADING, "Salt & pepper")]);
    }
}
