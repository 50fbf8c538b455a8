use super::index::VectorIndex;
use super::types::{RetrievalError, ScoredChunk};
use crate::embedding::EmbeddingClient;
use std::sync::Arc;

/// Embeds questions and looks up the nearest chunks in an index.
///
/// Shares its embedding client with the upload path so questions and chunks live in the same
/// vector space.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    top_k: usize,
}

impl Retriever {
    /// Create a retriever returning up to `top_k` chunks per question.
    pub fn new(embedder: Arc<dyn EmbeddingClient>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    /// Number of chunks requested per question.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Return the chunks of `index` closest to `question`, nearest first.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let query = vectors.pop().ok_or(RetrievalError::EmptyEmbedding)?;

        let hits = index.search(&query, self.top_k)?;
        tracing::debug!(
            top_k = self.top_k,
            dimension = index.dimension(),
            hits = hits.len(),
            best_score = hits.first().map(|hit| hit.score),
            pages = ?hits.iter().map(|hit| hit.chunk.metadata.page).collect::<Vec<_>>(),
            "Retrieved context"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingClientError, HashingEmbeddingClient};
    use crate::rag::types::{Chunk, ChunkMetadata, DocumentInfo, IndexError};
    use async_trait::async_trait;

    async fn index_for(embedder: &HashingEmbeddingClient, texts: &[&str]) -> VectorIndex {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                text: (*text).to_string(),
                metadata: ChunkMetadata { page: i + 1, start: 0 },
            })
            .collect();
        let vectors = embedder
            .generate_embeddings(chunks.iter().map(|chunk| chunk.text.clone()).collect())
            .await
            .expect("embeddings");
        VectorIndex::build(
            chunks,
            vectors,
            128,
            DocumentInfo {
                filename: None,
                fingerprint: String::new(),
                pages: texts.len(),
                chunks: texts.len(),
                indexed_at: String::new(),
            },
        )
        .expect("index")
    }

    #[tokio::test]
    async fn returns_most_relevant_chunk_first() {
        let embedder = HashingEmbeddingClient::new(128);
        let index = index_for(
            &embedder,
            &[
                "Bananas ripen quickly in warm kitchens.",
                "The capital of France is Paris.",
                "Rust compiles to native code.",
            ],
        )
        .await;

        let retriever = Retriever::new(Arc::new(embedder), 2);
        assert_eq!(retriever.top_k(), 2);
        let hits = retriever
            .retrieve(&index, "What is the capital of France?")
            .await
            .expect("hits");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "The capital of France is Paris.");
        assert_eq!(hits[0].chunk.metadata.page, 2);
    }

    struct SilentEmbedder;

    #[async_trait]
    impl EmbeddingClient for SilentEmbedder {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn missing_query_vector_is_an_error() {
        let index = index_for(&HashingEmbeddingClient::new(128), &["text"]).await;
        let retriever = Retriever::new(Arc::new(SilentEmbedder), 2);
        let error = retriever.retrieve(&index, "question").await.unwrap_err();
        assert!(matches!(error, RetrievalError::EmptyEmbedding));
    }

    #[tokio::test]
    async fn query_dimension_must_match_index() {
        let index = index_for(&HashingEmbeddingClient::new(128), &["text"]).await;
        let retriever = Retriever::new(Arc::new(HashingEmbeddingClient::new(64)), 2);
        let error = retriever.retrieve(&index, "question").await.unwrap_err();
        assert!(matches!(
            error,
            RetrievalError::Index(IndexError::DimensionMismatch { expected: 128, actual: 64 })
        ));
    }
}
