//! Text extraction for source files.
//!
//! Plain text and Markdown are read as UTF-8. PDFs go through `pdf-extract`;
//! a PDF without a text layer yields an empty string, which ingestion counts
//! as an empty document.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::debug;

use crate::error::IngestError;

/// File kinds with a text extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
}

impl FileKind {
    /// Classify by extension, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" | "markdown" | "text" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Extract the text of the file at `path`.
///
/// Unknown extensions are read as UTF-8 text.
pub fn extract_text(path: &Path) -> Result<String, IngestError> {
    match FileKind::from_path(path) {
        Some(FileKind::Pdf) => {
            debug!("Extracting PDF: {:?}", path);
            let bytes = fs::read(path)?;
            extract_pdf_text(&bytes)
                .map_err(|e| IngestError::Extract(format!("{}: {e}", path.display())))
        }
        Some(FileKind::Text) | None => Ok(fs::read_to_string(path)?),
    }
}

/// Extract text from PDF bytes.
///
/// `pdf-extract` panics on some malformed inputs; that is reported as an
/// error for the one file instead of unwinding through the scan.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => Ok(normalize_pdf_text(&text)),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF parser panicked".to_string()),
    }
}

/// Trim trailing spaces per line and collapse runs of blank lines into one,
/// so page breaks become paragraph breaks for the chunker.
fn normalize_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
