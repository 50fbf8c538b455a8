//! Embedding client abstraction and adapters.
//!
//! Every adapter returns one vector per input text, in input order. Hosted adapters split large
//! inputs into batches and retry transient failures according to the configured [`RetryPolicy`].

mod hashing;
mod huggingface;
mod ollama;

pub use hashing::HashingEmbeddingClient;
pub use huggingface::HuggingFaceEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use crate::retry::{AttemptError, RetryPolicy, is_transient_status, is_transient_transport};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Backend could not be reached, refused the credentials, or has not loaded the model.
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider answered with a body that does not match the expected shape.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build the embedding client selected by `EMBEDDING_PROVIDER`.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let retry = RetryPolicy::from_config(config);
    let client: Box<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::HuggingFace => Box::new(HuggingFaceEmbeddingClient::new(
            build_http_client(config)?,
            config.embedding_url.as_deref(),
            &config.embedding_model,
            config.hf_api_token.clone(),
            config.embedding_batch_size,
            retry,
        )),
        EmbeddingProvider::Ollama => Box::new(OllamaEmbeddingClient::new(
            build_http_client(config)?,
            config.embedding_url.as_deref(),
            &config.embedding_model,
            config.embedding_batch_size,
            retry,
        )),
        EmbeddingProvider::Hashing => {
            Box::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Embedding client initialized"
    );
    Ok(client)
}

fn build_http_client(config: &Config) -> Result<Client, EmbeddingClientError> {
    Client::builder()
        .user_agent("pdf-rag/embedding")
        .timeout(config.upstream_timeout())
        .build()
        .map_err(|error| {
            EmbeddingClientError::ModelUnavailable(format!("failed to build HTTP client: {error}"))
        })
}

/// Map a transport failure to an attempt outcome.
fn transport_failure(
    provider: &str,
    endpoint: &str,
    error: &reqwest::Error,
) -> AttemptError<EmbeddingClientError> {
    let wrapped =
        EmbeddingClientError::ModelUnavailable(format!("failed to reach {provider} at {endpoint}: {error}"));
    if is_transient_transport(error) {
        AttemptError::Transient(wrapped)
    } else {
        AttemptError::Permanent(wrapped)
    }
}

/// Turn a non-success response into an attempt outcome; returns the response untouched otherwise.
async fn check_status(
    provider: &str,
    response: Response,
) -> Result<Response, AttemptError<EmbeddingClientError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{provider} returned {status}: {body}");
    let error = match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND
        | StatusCode::SERVICE_UNAVAILABLE => EmbeddingClientError::ModelUnavailable(message),
        _ => EmbeddingClientError::GenerationFailed(message),
    };
    if is_transient_status(status) {
        Err(AttemptError::Transient(error))
    } else {
        Err(AttemptError::Permanent(error))
    }
}

fn ensure_count(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() == expected {
        Ok(vectors)
    } else {
        Err(EmbeddingClientError::InvalidResponse(format!(
            "expected {expected} vectors, received {}",
            vectors.len()
        )))
    }
}
