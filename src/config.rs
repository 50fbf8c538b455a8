use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_LLM_MODEL: &str = "llama3-70b-8192";
const DEFAULT_LLM_TEMPERATURE: f32 = 0.5;
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";
const DEFAULT_EMBEDDING_DIMENSION: usize = 768;
const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
const DEFAULT_CHUNK_SIZE: usize = 900;
const DEFAULT_CHUNK_OVERLAP: usize = 100;
const DEFAULT_TOP_K: usize = 2;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPSTREAM_MAX_RETRIES: u32 = 2;
const DEFAULT_UPSTREAM_RETRY_BASE_MS: u64 = 250;
const DEFAULT_PDFTOTEXT_BIN: &str = "pdftotext";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const DEFAULT_SERVER_PORT: u16 = 8000;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Values parsed individually but contradict each other.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the PDF question-answering server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Credential for the hosted chat completion API.
    pub groq_api_key: String,
    /// Base URL of the OpenAI-compatible chat completion API.
    pub llm_base_url: String,
    /// Chat model identifier.
    pub llm_model: String,
    /// Sampling temperature passed with every completion request.
    pub llm_temperature: f32,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Optional override for the provider's base URL.
    pub embedding_url: Option<String>,
    /// Optional bearer token for the Hugging Face inference API.
    pub hf_api_token: Option<String>,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Maximum number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of a page.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Request timeout for hosted embedding and LLM calls, in seconds.
    pub upstream_timeout_secs: u64,
    /// Retries attempted for transient upstream failures.
    pub upstream_max_retries: u32,
    /// Initial backoff between retries, in milliseconds.
    pub upstream_retry_base_ms: u64,
    /// Path or name of the `pdftotext` binary.
    pub pdftotext_bin: String,
    /// Maximum accepted upload body size.
    pub max_upload_bytes: usize,
    /// Port the HTTP server binds on all interfaces.
    pub server_port: u16,
}

/// Supported embedding backends for the indexing pipeline.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted Hugging Face feature-extraction endpoint.
    HuggingFace,
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic feature hashing, no network access.
    Hashing,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            groq_api_key: load_env("GROQ_API_KEY")?,
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_env_or("LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE)?,
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::HuggingFace),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_url: load_env_optional("EMBEDDING_URL"),
            hf_api_token: load_env_optional("HF_API_TOKEN"),
            embedding_dimension: parse_env_or("EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            embedding_batch_size: parse_env_or(
                "EMBEDDING_BATCH_SIZE",
                DEFAULT_EMBEDDING_BATCH_SIZE,
            )?,
            chunk_size: parse_env_or("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            chunk_overlap: parse_env_or("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?,
            retrieval_top_k: parse_env_or("RETRIEVAL_TOP_K", DEFAULT_TOP_K)?,
            upstream_timeout_secs: parse_env_or(
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )?,
            upstream_max_retries: parse_env_or(
                "UPSTREAM_MAX_RETRIES",
                DEFAULT_UPSTREAM_MAX_RETRIES,
            )?,
            upstream_retry_base_ms: parse_env_or(
                "UPSTREAM_RETRY_BASE_MS",
                DEFAULT_UPSTREAM_RETRY_BASE_MS,
            )?,
            pdftotext_bin: load_env_optional("PDFTOTEXT_BIN")
                .unwrap_or_else(|| DEFAULT_PDFTOTEXT_BIN.to_string()),
            max_upload_bytes: parse_env_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            server_port: parse_env_or("SERVER_PORT", DEFAULT_SERVER_PORT)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the pipeline unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        Ok(())
    }

    /// Timeout applied to hosted embedding and LLM requests.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Aborts the process when the LLM credential is missing or any value is invalid.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        llm_model = %config.llm_model,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        top_k = config.retrieval_top_k,
        server_port = config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        groq_api_key: "test-key".into(),
        llm_base_url: "http://127.0.0.1:9".into(),
        llm_model: DEFAULT_LLM_MODEL.into(),
        llm_temperature: DEFAULT_LLM_TEMPERATURE,
        embedding_provider: EmbeddingProvider::Hashing,
        embedding_model: DEFAULT_EMBEDDING_MODEL.into(),
        embedding_url: None,
        hf_api_token: None,
        embedding_dimension: 64,
        embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
        chunk_size: DEFAULT_CHUNK_SIZE,
        chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        retrieval_top_k: DEFAULT_TOP_K,
        upstream_timeout_secs: 5,
        upstream_max_retries: 0,
        upstream_retry_base_ms: 0,
        pdftotext_bin: DEFAULT_PDFTOTEXT_BIN.into(),
        max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        server_port: DEFAULT_SERVER_PORT,
    }
}
