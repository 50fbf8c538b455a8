//! Character-window chunking of extracted pages.
//!
//! Each page is cut into windows of at most `chunk_size` characters. A window that does not
//! reach the end of its page is shortened to end after the last whitespace character in its
//! second half when there is one, so words are rarely split; otherwise it ends at the hard limit.
//! The next window starts exactly `chunk_overlap` characters before the previous one ended.
//!
//! Dropping the trailing `chunk_overlap` characters of every non-final chunk of a page and
//! concatenating what remains reproduces the page text exactly.

use super::types::{Chunk, ChunkMetadata, ChunkingError};
use crate::pdf::Page;

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 900;
/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Chunk size and overlap, both measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    /// Maximum chunk length.
    pub chunk_size: usize,
    /// Characters repeated at the start of the following chunk.
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingOptions {
    fn validate(&self) -> Result<(), ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.chunk_overlap,
                size: self.chunk_size,
            });
        }
        Ok(())
    }
}

/// Split pages into chunks, preserving page order and carrying page numbers forward.
///
/// Blank pages contribute nothing; an empty page list yields an empty chunk list.
pub fn chunk_pages(pages: &[Page], options: &ChunkingOptions) -> Result<Vec<Chunk>, ChunkingError> {
    options.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        for (start, text) in split_text(&page.text, options) {
            chunks.push(Chunk {
                text,
                metadata: ChunkMetadata {
                    page: page.number,
                    start,
                },
            });
        }
    }
    Ok(chunks)
}

/// Split one page into `(start_offset, text)` windows. Offsets count characters.
fn split_text(text: &str, options: &ChunkingOptions) -> Vec<(usize, String)> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + options.chunk_size).min(total);
        if hard_end == total {
            windows.push((start, chars[start..total].iter().collect()));
            break;
        }

        let end = soft_end(&chars, start, hard_end, options);
        windows.push((start, chars[start..end].iter().collect()));
        start = end - options.chunk_overlap;
    }

    windows
}

/// Pick the end of a non-final window.
///
/// The end never falls below `start + overlap + 1`, so every window advances the cursor.
fn soft_end(chars: &[char], start: usize, hard_end: usize, options: &ChunkingOptions) -> usize {
    let floor = start + (options.chunk_size / 2).max(options.chunk_overlap + 1);
    (floor..=hard_end)
        .rev()
        .find(|&end| chars[end - 1].is_whitespace())
        .unwrap_or(hard_end)
}
