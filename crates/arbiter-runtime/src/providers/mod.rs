//! Judge/model providers.
//!
//! A provider is a text-in/text-out call with token and latency metadata.
//! Retry policy lives here, not in individual providers: up to three
//! retries with exponential backoff starting at two seconds, doubling
//! each attempt, on rate-limit, timeout and transient server errors.
//! Everything else propagates immediately.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use thiserror::Error;

mod credential;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use credential::{ApiCredential, CredentialSource};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicJudge;

/// Maximum retry attempts for transient errors.
pub const MAX_RETRIES: usize = 3;

/// Initial backoff before the first retry.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Errors from judge providers.
#[derive(Error, Debug)]
pub enum JudgeError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed")]
    Auth,

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("judge response parse error: {0}")]
    Parse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl JudgeError {
    /// Whether this error class is worth retrying: rate limits, timeouts
    /// and transient server errors. Auth failures and client errors are
    /// not.
    pub fn is_retryable(&self) -> bool {
        match self {
            JudgeError::RateLimited { .. } | JudgeError::Timeout(_) => true,
            JudgeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Response from a judge call.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeResponse {
    /// The model's text output.
    pub text: String,
    /// The model the provider actually resolved to.
    pub resolved_model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_seconds: f64,
}

/// Provider abstraction for judge/model calls.
#[async_trait]
pub trait JudgeProvider: Send + Sync {
    /// Execute a single-turn call. Implementations do NOT retry; use
    /// [`call_with_retry`] for the retry contract.
    async fn call(
        &self,
        prompt: &str,
        system: Option<&str>,
        model: &str,
        max_tokens: u32,
    ) -> Result<JudgeResponse, JudgeError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Call a provider with the standard retry contract.
pub async fn call_with_retry(
    provider: &dyn JudgeProvider,
    prompt: &str,
    system: Option<&str>,
    model: &str,
    max_tokens: u32,
) -> Result<JudgeResponse, JudgeError> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(INITIAL_BACKOFF)
        .with_factor(2.0)
        .with_max_times(MAX_RETRIES);

    (|| async { provider.call(prompt, system, model, max_tokens).await })
        .retry(backoff)
        .when(JudgeError::is_retryable)
        .notify(|err, dur| {
            tracing::warn!(error = %err, wait = ?dur, "retryable judge error");
        })
        .await
}
