use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

use localrag_core::types::{Block, BlockKind};
use localrag_core::{unified_chunk, ChunkParams, Error};
use localrag_ingest::{DocumentLoader, FileFormat, LEADING_HEADING};

fn write_docx(path: &Path, body: &str) {
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    );
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default()).unwrap();
    zip.write_all(xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

fn para(style: Option<&str>, text: &str) -> String {
    let ppr = style.map(|s| format!(r#"<w:pPr><w:pStyle w:val="{s}"/></w:pPr>"#)).unwrap_or_default();
    format!("<w:p>{ppr}<w:r><w:t>{text}</w:t></w:r></w:p>")
}

fn table(rows: &[&[&str]]) -> String {
    let rows: String = rows
        .iter()
        .map(|r| format!("<w:tr>{}</w:tr>", r.iter().map(|c| format!("<w:tc>{}</w:tc>", para(None, c))).collect::<String>()))
        .collect();
    format!("<w:tbl>{rows}</w:tbl>")
}

#[test]
fn format_is_chosen_by_extension() {
    assert_eq!(FileFormat::from_path(Path::new("a/notes.TXT")).unwrap(), FileFormat::Text);
    assert_eq!(FileFormat::from_path(Path::new("report.docx")).unwrap(), FileFormat::Docx);
    assert_eq!(FileFormat::from_path(Path::new("manual.pdf")).unwrap(), FileFormat::Pdf);
}

#[test]
fn unsupported_extension_fails_before_reading() {
    let loader = DocumentLoader::default();
    match loader.process_file(Path::new("/does/not/exist/data.csv")) {
        Err(Error::UnsupportedFormat(ext)) => assert_eq!(ext, "csv"),
        other => panic!("expected UnsupportedFormat, got {other:?}"),
    }
}

#[test]
fn text_file_splits_on_uppercase_headings() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "INTRO\nhello world\n\nDETAILS\nmore text").unwrap();

    let blocks = DocumentLoader::default().process_file(&path).unwrap();
    assert_eq!(blocks, vec![Block::text("INTRO", "hello world"), Block::text("DETAILS", "more text")]);

    let chunks = unified_chunk(&blocks, &ChunkParams::default().with_min_words(0));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].heading, "INTRO");
    assert_eq!(chunks[1].heading, "DETAILS");
}

#[test]
fn text_before_first_heading_gets_leading_heading() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("plain.txt");
    fs::write(&path, "just some words\non two lines").unwrap();

    let blocks = DocumentLoader::default().process_file(&path).unwrap();
    assert_eq!(blocks, vec![Block::text(LEADING_HEADING, "just some words\non two lines")]);
}

#[test]
fn docx_headings_and_tables_in_document_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("manual.docx");
    let body = [
        para(None, "Opening remarks."),
        para(Some("Heading1"), "Setup"),
        para(None, "Unpack the unit."),
        para(None, "Plug it in."),
        table(&[&["Part", "Qty"], &["bolt", "4"]]),
        para(Some("heading2"), "Care"),
        para(None, "Wipe monthly."),
    ]
    .concat();
    write_docx(&path, &body);

    let blocks = DocumentLoader::default().process_file(&path).unwrap();
    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0], Block::text(LEADING_HEADING, "Opening remarks."));
    assert_eq!(blocks[1], Block::text("Setup", "Unpack the unit.\nPlug it in."));
    assert_eq!(blocks[2].kind, BlockKind::Table);
    assert_eq!(blocks[2].heading, "Setup");
    assert_eq!(blocks[2].content, "| Part | Qty |\n| --- | --- |\n| bolt | 4 |");
    assert_eq!(blocks[3], Block::text("Care", "Wipe monthly."));
}

#[test]
fn corrupt_docx_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.docx");
    fs::write(&path, b"this is not a zip archive").unwrap();

    let err = DocumentLoader::default().process_file(&path).unwrap_err();
    match &err {
        Error::Adapter { path: p, .. } => assert_eq!(p, &path),
        other => panic!("expected Adapter error, got {other:?}"),
    }
    assert!(err.to_string().contains("broken.docx"));
}

#[test]
fn corrupt_pdf_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.pdf");
    fs::write(&path, b"%PDF-garbage").unwrap();

    let err = DocumentLoader::default().process_file(&path).unwrap_err();
    assert!(matches!(err, Error::Adapter { .. }), "got {err:?}");
}
