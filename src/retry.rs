//! Bounded retries for calls to hosted services.
//!
//! Only failures classified as transient by the caller are retried; everything else, and the
//! last transient failure once the budget is spent, is returned unchanged.

use crate::config::Config;
use reqwest::StatusCode;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Outcome of a single attempt that failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth another try (connection refused, timeout, 429, gateway errors).
    Transient(E),
    /// Retrying cannot help.
    Permanent(E),
}

/// Retry budget and backoff for upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following retry.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Build the policy from `UPSTREAM_MAX_RETRIES` and `UPSTREAM_RETRY_BASE_MS`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.upstream_max_retries,
            base_delay: Duration::from_millis(config.upstream_retry_base_ms),
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, or the retry budget is exhausted.
    pub async fn run<T, E, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError<E>>>,
        E: Display,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Transient(error)) if retries < self.max_retries => {
                    let delay = self.delay_for(retries);
                    retries += 1;
                    tracing::warn!(
                        operation,
                        retry = retries,
                        max_retries = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient upstream failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transient(error) | AttemptError::Permanent(error)) => {
                    return Err(error);
                }
            }
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(retry))
    }
}

/// Status codes that usually clear up on their own.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Transport failures that happened before a response arrived.
pub fn is_transient_transport(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}
