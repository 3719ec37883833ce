//! localrag-ingest
//!
//! Format adapters that turn a file into an ordered list of typed blocks.
//! Dispatch goes through [`FileFormat`], so everything downstream of
//! [`DocumentLoader::process_file`] is format-agnostic.

pub mod docx;
pub mod markdown;
pub mod pdf;
pub mod text;

use std::path::Path;
use tracing::info;

use localrag_core::types::Block;
use localrag_core::Error;

pub use docx::DocxAdapter;
pub use pdf::PdfAdapter;
pub use text::TextAdapter;

/// Heading used until a document's first detected heading.
pub const LEADING_HEADING: &str = "Introduction";

/// Shared capability of every format adapter.
pub trait FormatAdapter: Send + Sync {
    fn extract(&self, path: &Path) -> anyhow::Result<Vec<Block>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Text,
    Docx,
    Pdf,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        match ext.as_str() {
            "txt" | "text" => Ok(Self::Text),
            "docx" => Ok(Self::Docx),
            "pdf" => Ok(Self::Pdf),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Owns one adapter per [`FileFormat`] variant.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    text: TextAdapter,
    docx: DocxAdapter,
    pdf: PdfAdapter,
}

impl DocumentLoader {
    pub fn new(pdf: PdfAdapter) -> Self { Self { pdf, ..Self::default() } }

    fn adapter(&self, format: FileFormat) -> &dyn FormatAdapter {
        match format {
            FileFormat::Text => &self.text,
            FileFormat::Docx => &self.docx,
            FileFormat::Pdf => &self.pdf,
        }
    }

    /// Detect the format of `path` and extract its blocks.
    ///
    /// Unknown extensions fail with [`Error::UnsupportedFormat`] before any I/O;
    /// parse failures come back as [`Error::Adapter`] carrying the path.
    pub fn process_file(&self, path: &Path) -> Result<Vec<Block>, Error> {
        let format = FileFormat::from_path(path)?;
        info!(path = %path.display(), ?format, "extracting blocks");
        let blocks = self.adapter(format).extract(path).map_err(|e| Error::adapter(path, e))?;
        info!(path = %path.display(), blocks = blocks.len(), "extracted blocks");
        Ok(blocks)
    }
}
