//! Retrieval pipeline: chunking, indexing, retrieval, prompt assembly and the service tying them
//! together.

pub mod chunking;
pub mod index;
pub mod prompt;
mod retriever;
mod service;
pub mod types;

pub use chunking::{ChunkingOptions, chunk_pages};
pub use index::{IndexHandle, IndexState, VectorIndex};
pub use prompt::{assemble_prompt, format_context};
pub use retriever::Retriever;
pub use service::{PipelineSettings, RagApi, RagService};
pub use types::{
    Answer, Chunk, ChunkMetadata, ChunkingError, DocumentInfo, DocumentUpload,
    INDEX_NOT_READY_MESSAGE, IndexError, IndexStatus, RagError, RetrievalError, ScoredChunk,
    UploadOutcome,
};
