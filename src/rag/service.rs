//! Service coordinating extraction, chunking, embedding, indexing and answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, get_embedding_client},
    llm::{ChatClient, GroqChatClient},
    metrics::{MetricsSnapshot, RagMetrics},
    pdf::{PageExtractor, PdftotextExtractor},
    rag::{
        chunking::{ChunkingOptions, chunk_pages},
        index::{DEFAULT_TOP_K, IndexHandle, VectorIndex},
        prompt::assemble_prompt,
        retriever::Retriever,
        types::{Answer, DocumentInfo, DocumentUpload, IndexStatus, RagError, UploadOutcome},
    },
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Tunables of the pipeline that do not belong to a specific backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Chunk size and overlap.
    pub chunking: ChunkingOptions,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Vector length every embedding must have.
    pub embedding_dimension: usize,
}

impl PipelineSettings {
    /// Default chunking and retrieval settings for embeddings of `embedding_dimension`.
    pub fn with_dimension(embedding_dimension: usize) -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            top_k: DEFAULT_TOP_K,
            embedding_dimension,
        }
    }

    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: ChunkingOptions {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
            },
            top_k: config.retrieval_top_k,
            embedding_dimension: config.embedding_dimension,
        }
    }
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Index an uploaded document, replacing the active index on success.
    async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, RagError>;

    /// Answer a question from the active index.
    async fn answer(&self, question: &str) -> Result<Answer, RagError>;

    /// Describe the active index.
    fn status(&self) -> IndexStatus;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the pipeline components and the active index.
///
/// Construct once at startup and share through an `Arc`; every request goes through the same
/// [`IndexHandle`].
pub struct RagService {
    extractor: Box<dyn PageExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    retriever: Retriever,
    chat: Box<dyn ChatClient>,
    index: IndexHandle,
    settings: PipelineSettings,
    metrics: RagMetrics,
}

impl RagService {
    /// Assemble a service from explicit components.
    pub fn new(
        extractor: Box<dyn PageExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        chat: Box<dyn ChatClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            retriever: Retriever::new(Arc::clone(&embedder), settings.top_k),
            embedder,
            chat,
            index: IndexHandle::new(),
            settings,
            metrics: RagMetrics::new(),
        }
    }

    /// Build the production service: `pdftotext`, the configured embedder and the Groq client.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        let extractor = PdftotextExtractor::new(config.pdftotext_bin.clone());
        let embedder: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client(config)?);
        let chat = GroqChatClient::from_config(config)?;
        tracing::info!(
            llm_model = %config.llm_model,
            pdftotext = %config.pdftotext_bin,
            "RAG service initialized"
        );
        Ok(Self::new(
            Box::new(extractor),
            embedder,
            Box::new(chat),
            PipelineSettings::from_config(config),
        ))
    }

    /// Extract, chunk, embed and index a document, then swap it in as the active index.
    ///
    /// A failure at any step leaves the previously active index in place.
    pub async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, RagError> {
        let DocumentUpload { filename, bytes } = upload;
        let started = Instant::now();
        tracing::info!(filename = ?filename, bytes = bytes.len(), "Processing upload");

        let fingerprint = hex::encode(Sha256::digest(&bytes));
        let pages = self.extractor.extract_pages(&bytes).await?;
        let chunks = chunk_pages(&pages, &self.settings.chunking)?;
        if chunks.is_empty() {
            tracing::warn!(filename = ?filename, pages = pages.len(), "Upload contained no text");
            return Err(RagError::EmptyDocument);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.generate_embeddings(texts).await?;

        let document = DocumentInfo {
            filename,
            fingerprint,
            pages: pages.len(),
            chunks: chunks.len(),
            indexed_at: current_timestamp_rfc3339(),
        };
        let index = VectorIndex::build(
            chunks,
            vectors,
            self.settings.embedding_dimension,
            document.clone(),
        )?;
        let replaced_previous = self.index.replace(index).is_some();

        self.metrics.record_document(document.chunks as u64);
        tracing::info!(
            filename = ?document.filename,
            fingerprint = %document.fingerprint,
            pages = document.pages,
            chunks = document.chunks,
            replaced_previous,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Document indexed"
        );

        Ok(UploadOutcome {
            document,
            replaced_previous,
        })
    }

    /// Answer `question` from the active index.
    ///
    /// Fails with `IndexError::NotReady` before the first successful upload.
    pub async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        let index = self.index.current()?;
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "user_question must not be empty".to_string(),
            ));
        }

        match self.answer_from(&index, question).await {
            Ok(answer) => {
                self.metrics.record_answer();
                Ok(answer)
            }
            Err(error) => {
                self.metrics.record_query_failure();
                tracing::warn!(error = %error, "Query failed");
                Err(error)
            }
        }
    }

    async fn answer_from(&self, index: &VectorIndex, question: &str) -> Result<Answer, RagError> {
        let sources = self.retriever.retrieve(index, question).await?;
        let prompt = assemble_prompt(question, sources.iter().map(|hit| &hit.chunk));
        let response = self.chat.complete(&prompt).await?;
        tracing::info!(
            top_k = self.retriever.top_k(),
            sources = sources.len(),
            document = %index.document().fingerprint,
            "Question answered"
        );
        Ok(Answer { response, sources })
    }

    /// Describe the active index.
    pub fn status(&self) -> IndexStatus {
        self.index.status()
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn upload(&self, upload: DocumentUpload) -> Result<UploadOutcome, RagError> {
        RagService::upload(self, upload).await
    }

    async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        RagService::answer(self, question).await
    }

    fn status(&self) -> IndexStatus {
        RagService::status(self)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        RagService::metrics_snapshot(self)
    }
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::llm::LlmError;
    use crate::pdf::{ExtractionError, Page};
    use crate::rag::types::IndexError;
    use parking_lot::Mutex;

    /// Treats upload bytes as UTF-8 text with pages separated by form feeds.
    struct TextExtractor;

    #[async_trait]
    impl PageExtractor for TextExtractor {
        async fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<Page>, ExtractionError> {
            let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::NotPdf)?;
            Ok(text
                .split('\u{c}')
                .enumerate()
                .map(|(i, page)| Page::new(i + 1, page))
                .collect())
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatClient for RecordingChat {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().push(prompt.to_string());
            if self.fail {
                Err(LlmError::Upstream("provider returned 503".into()))
            } else {
                Ok("stub answer".into())
            }
        }
    }

    fn service_with(chat: RecordingChat) -> RagService {
        RagService::new(
            Box::new(TextExtractor),
            Arc::new(HashingEmbeddingClient::new(128)),
            Box::new(chat),
            PipelineSettings::with_dimension(128),
        )
    }

    fn upload(name: &str, text: &str) -> DocumentUpload {
        DocumentUpload {
            filename: Some(name.to_string()),
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn answer_before_upload_is_not_ready() {
        let service = service_with(RecordingChat::default());
        let error = service.answer("anything?").await.unwrap_err();
        assert!(matches!(error, RagError::Index(IndexError::NotReady)));
        assert_eq!(service.status(), IndexStatus::Empty);
    }

    #[tokio::test]
    async fn upload_reports_document_metadata() {
        let service = service_with(RecordingChat::default());
        let outcome = service
            .upload(upload("geo.pdf", "The capital of France is Paris.\u{c}Second page."))
            .await
            .expect("upload");

        assert!(!outcome.replaced_previous);
        assert_eq!(outcome.document.filename.as_deref(), Some("geo.pdf"));
        assert_eq!(outcome.document.pages, 2);
        assert_eq!(outcome.document.chunks, 2);
        assert_eq!(outcome.document.fingerprint.len(), 64);
        assert!(matches!(service.status(), IndexStatus::Ready { .. }));
        assert_eq!(service.metrics_snapshot().chunks_indexed, 2);
    }

    #[tokio::test]
    async fn answer_places_retrieved_chunk_in_prompt() {
        let service = service_with(RecordingChat::default());
        service
            .upload(upload(
                "geo.pdf",
                "Bananas ripen quickly in warm kitchens.\u{c}The capital of France is Paris.",
            ))
            .await
            .expect("upload");

        let answer = service
            .answer("What is the capital of France?")
            .await
            .expect("answer");

        assert_eq!(answer.response, "stub answer");
        assert_eq!(answer.sources[0].chunk.text, "The capital of France is Paris.");
        assert_eq!(service.metrics_snapshot().queries_answered, 1);
    }

    #[tokio::test]
    async fn empty_document_keeps_previous_index() {
        let service = service_with(RecordingChat::default());
        service
            .upload(upload("first.pdf", "Original content."))
            .await
            .expect("upload");

        let error = service
            .upload(upload("blank.pdf", "   \u{c}\n"))
            .await
            .unwrap_err();

        assert!(matches!(error, RagError::EmptyDocument));
        assert!(matches!(
            service.status(),
            IndexStatus::Ready { document } if document.filename.as_deref() == Some("first.pdf")
        ));
    }

    #[tokio::test]
    async fn reupload_replaces_index() {
        let service = service_with(RecordingChat::default());
        service
            .upload(upload("a.pdf", "Bananas ripen quickly in warm kitchens."))
            .await
            .expect("upload a");
        let outcome = service
            .upload(upload("b.pdf", "The capital of France is Paris."))
            .await
            .expect("upload b");

        assert!(outcome.replaced_previous);
        let answer = service
            .answer("What is the capital of France?")
            .await
            .expect("answer");
        assert!(answer.sources.iter().all(|hit| !hit.chunk.text.contains("Bananas")));
    }

    #[tokio::test]
    async fn blank_question_is_invalid_input() {
        let service = service_with(RecordingChat::default());
        service
            .upload(upload("a.pdf", "Some text."))
            .await
            .expect("upload");
        let error = service.answer("   ").await.unwrap_err();
        assert!(matches!(error, RagError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn upstream_failure_is_surfaced_and_counted() {
        let service = service_with(RecordingChat {
            fail: true,
            ..RecordingChat::default()
        });
        service
            .upload(upload("a.pdf", "Some text."))
            .await
            .expect("upload");

        let error = service.answer("What?").await.unwrap_err();
        assert!(matches!(error, RagError::Llm(LlmError::Upstream(_))));
        assert_eq!(service.metrics_snapshot().query_failures, 1);
    }

    #[tokio::test]
    async fn embedding_dimension_mismatch_fails_upload() {
        let service = RagService::new(
            Box::new(TextExtractor),
            Arc::new(HashingEmbeddingClient::new(32)),
            Box::new(RecordingChat::default()),
            PipelineSettings::with_dimension(128),
        );
        let error = service
            .upload(upload("a.pdf", "Some text."))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RagError::Index(IndexError::DimensionMismatch { expected: 128, actual: 32 })
        ));
    }
}
