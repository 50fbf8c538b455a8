//! Core data types and error definitions for the retrieval pipeline.

use crate::embedding::EmbeddingClientError;
use crate::llm::LlmError;
use crate::pdf::ExtractionError;
use serde::Serialize;
use thiserror::Error;

/// Message returned to clients that query before any document was indexed.
pub const INDEX_NOT_READY_MESSAGE: &str = "Vectorstore not created. Upload a file first.";

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// 1-based page number of the originating page.
    pub page: usize,
    /// Character offset of the chunk's first character within that page.
    pub start: usize,
}

/// Bounded, overlapping text segment of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Chunk text, never longer than the configured chunk size in characters.
    pub text: String,
    /// Source location of the chunk.
    pub metadata: ChunkMetadata,
}

/// Chunk returned by a similarity search together with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Matching chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1, 1]`.
    pub score: f32,
}

/// Description of the document behind the active index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentInfo {
    /// File name supplied with the upload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Hex-encoded SHA-256 of the uploaded bytes.
    pub fingerprint: String,
    /// Pages reported by the extractor.
    pub pages: usize,
    /// Chunks stored in the index.
    pub chunks: usize,
    /// RFC 3339 timestamp of when the index was built.
    pub indexed_at: String,
}

/// Raw upload handed to the pipeline.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Client-supplied file name.
    pub filename: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Metadata of the document now being served.
    pub document: DocumentInfo,
    /// Whether an earlier index was discarded.
    pub replaced_previous: bool,
}

/// Result of a successful question.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    /// Model reply, verbatim.
    pub response: String,
    /// Chunks that were placed in the prompt, nearest first.
    pub sources: Vec<ScoredChunk>,
}

/// Externally visible index state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IndexStatus {
    /// No document has been indexed yet.
    Empty,
    /// A document is indexed and queries are accepted.
    Ready {
        /// Document behind the active index.
        document: DocumentInfo,
    },
}

/// Errors produced while splitting pages into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Chunk size of zero can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk size.
        size: usize,
    },
}

/// Errors raised by the vector index.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// No document has been indexed yet.
    #[error("Vectorstore not created. Upload a file first.")]
    NotReady,
    /// Building an index requires at least one chunk.
    #[error("cannot build an index without chunks")]
    Empty,
    /// Chunk and vector counts differ.
    #[error("received {vectors} vectors for {chunks} chunks")]
    CountMismatch {
        /// Number of chunks supplied.
        chunks: usize,
        /// Number of vectors supplied.
        vectors: usize,
    },
    /// A vector's length differs from the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Errors emitted while retrieving context for a question.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Embedding provider failed to embed the question.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Embedding provider returned no vector for the question.
    #[error("Embedding provider returned no vector for the question")]
    EmptyEmbedding,
    /// Search against the index failed.
    #[error("Search failed: {0}")]
    Index(#[from] IndexError),
}

/// Errors surfaced by the upload and query pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// Request carried unusable input.
    #[error("{0}")]
    InvalidInput(String),
    /// Page extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Extraction succeeded but produced no text to index.
    #[error("No extractable text found in the uploaded document")]
    EmptyDocument,
    /// Chunking configuration was rejected.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed while indexing.
    #[error("Failed to embed document: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index construction or lookup failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Retrieval for a question failed.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    /// Completion request failed.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl RagError {
    /// Whether the error means no document has been indexed yet.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            Self::Index(IndexError::NotReady)
                | Self::Retrieval(RetrievalError::Index(IndexError::NotReady))
        )
    }

    /// Whether the error was caused by the client's input rather than a backend.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::EmptyDocument | Self::Extraction(ExtractionError::NotPdf)
        )
    }
}
