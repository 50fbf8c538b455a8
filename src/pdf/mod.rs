//! PDF page extraction.
//!
//! Uploaded bytes are written to a temporary file and handed to poppler's `pdftotext`, which
//! separates pages with form feeds. The temporary file is removed when the extraction finishes,
//! whether it succeeded or not.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

const PDF_MAGIC: &[u8] = b"%PDF-";
const HEADER_SEARCH_WINDOW: usize = 1024;
const PAGE_BREAK: char = '\u{c}';

/// Text of a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number within the source document.
    pub number: usize,
    /// Extracted page text.
    pub text: String,
}

impl Page {
    /// Build a page from its number and text.
    pub fn new(number: usize, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// Errors raised while turning an upload into pages.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Uploaded bytes do not carry a PDF header.
    #[error("Uploaded file is not a PDF")]
    NotPdf,
    /// Temporary file handling failed.
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
    /// Extractor binary could not be started.
    #[error("PDF extractor '{binary}' unavailable: {source}")]
    ToolUnavailable {
        /// Binary we attempted to run.
        binary: String,
        /// Spawn failure reported by the OS.
        #[source]
        source: std::io::Error,
    },
    /// Extractor ran but reported a failure.
    #[error("PDF extraction failed ({status}): {stderr}")]
    Failed {
        /// Exit status description.
        status: String,
        /// Captured standard error output.
        stderr: String,
    },
}

/// Source of page text for uploaded documents.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extract the ordered pages of the document contained in `bytes`.
    async fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, ExtractionError>;
}

/// Extractor backed by the `pdftotext` command-line tool.
pub struct PdftotextExtractor {
    binary: String,
}

impl PdftotextExtractor {
    /// Use `binary` (a name on `PATH` or an absolute path) to extract text.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, path: &Path) -> Result<String, ExtractionError> {
        let output = Command::new(&self.binary)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractionError::ToolUnavailable {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PageExtractor for PdftotextExtractor {
    async fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, ExtractionError> {
        ensure_pdf(bytes)?;

        let staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".pdf")
            .tempfile()?;
        tokio::fs::write(staged.path(), bytes).await?;
        tracing::debug!(path = %staged.path().display(), bytes = bytes.len(), "Staged upload");

        let text = self.run(staged.path()).await?;
        let pages = split_pages(&text);
        tracing::debug!(pages = pages.len(), "Extracted PDF pages");
        Ok(pages)
    }
}

/// Reject uploads without a `%PDF-` marker near the start of the file.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), ExtractionError> {
    let head = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    if head.windows(PDF_MAGIC.len()).any(|window| window == PDF_MAGIC) {
        Ok(())
    } else {
        Err(ExtractionError::NotPdf)
    }
}

/// Split `pdftotext` output into pages on form feeds.
///
/// `pdftotext` terminates every page, including the last, with a form feed; the empty remainder
/// after the final one is not a page.
pub fn split_pages(output: &str) -> Vec<Page> {
    let mut segments: Vec<&str> = output.split(PAGE_BREAK).collect();
    if output.ends_with(PAGE_BREAK) {
        segments.pop();
    }
    if segments.len() == 1 && segments[0].is_empty() {
        return Vec::new();
    }
    segments
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page::new(index + 1, text))
        .collect()
}
