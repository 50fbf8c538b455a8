use super::{EmbeddingClient, EmbeddingClientError, check_status, ensure_count, transport_failure};
use crate::retry::{AttemptError, RetryPolicy};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const DEFAULT_HF_URL: &str = "https://router.huggingface.co/hf-inference/models";

/// Hosted sentence-embedding client for the Hugging Face feature-extraction pipeline.
pub struct HuggingFaceEmbeddingClient {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl HuggingFaceEmbeddingClient {
    /// Build a client for `model`, optionally against a non-default inference base URL.
    pub fn new(
        http: Client,
        base_url: Option<&str>,
        model: &str,
        api_token: Option<String>,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        let base = base_url.unwrap_or(DEFAULT_HF_URL).trim_end_matches('/');
        Self {
            http,
            endpoint: format!("{base}/{model}/pipeline/feature-extraction"),
            api_token,
            batch_size: batch_size.max(1),
            retry,
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        self.retry
            .run("huggingface_embeddings", move || async move {
                let mut request = self.http.post(&self.endpoint).json(&json!({
                    "inputs": batch,
                    "options": { "wait_for_model": true },
                }));
                if let Some(token) = &self.api_token {
                    request = request.bearer_auth(token);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|error| transport_failure("Hugging Face", &self.endpoint, &error))?;
                let response = check_status("Hugging Face", response).await?;
                let vectors: Vec<Vec<f32>> = response.json().await.map_err(|error| {
                    AttemptError::Permanent(EmbeddingClientError::InvalidResponse(format!(
                        "failed to decode feature-extraction response: {error}"
                    )))
                })?;
                ensure_count(batch.len(), vectors).map_err(AttemptError::Permanent)
            })
            .await
    }
}

#[async_trait]
impl EmbeddingClient for HuggingFaceEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            texts = texts.len(),
            batch_size = self.batch_size,
            "Requesting Hugging Face embeddings"
        );
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch).await?);
        }
        Ok(embeddings)
    }
}
