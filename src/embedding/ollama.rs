use super::{EmbeddingClient, EmbeddingClientError, check_status, ensure_count, transport_failure};
use crate::retry::{AttemptError, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Embedding client for a local Ollama runtime (`/api/embed`).
pub struct OllamaEmbeddingClient {
    http: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Build a client for `model` served by the Ollama runtime at `base_url`.
    pub fn new(
        http: Client,
        base_url: Option<&str>,
        model: &str,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        let base = base_url.unwrap_or(DEFAULT_OLLAMA_URL).trim_end_matches('/');
        Self {
            http,
            endpoint: format!("{base}/api/embed"),
            model: model.to_string(),
            batch_size: batch_size.max(1),
            retry,
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.retry
            .run("ollama_embeddings", move || async move {
                let response = self
                    .http
                    .post(&self.endpoint)
                    .json(&json!({ "model": self.model, "input": batch }))
                    .send()
                    .await
                    .map_err(|error| transport_failure("Ollama", &self.endpoint, &error))?;
                let response = check_status("Ollama", response).await?;
                let body: EmbedResponse = response.json().await.map_err(|error| {
                    AttemptError::Permanent(EmbeddingClientError::InvalidResponse(format!(
                        "failed to decode Ollama response: {error}"
                    )))
                })?;
                ensure_count(batch.len(), body.embeddings).map_err(AttemptError::Permanent)
            })
            .await
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            texts = texts.len(),
            "Requesting Ollama embeddings"
        );
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }
}
