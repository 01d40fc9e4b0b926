//! Provider gateway trait and normalized request/response types.
//!
//! The [`ProviderGateway`] trait abstracts over LLM providers, translating
//! between normalized [`ProviderRequest`]/[`ProviderResponse`] types and
//! provider-specific HTTP APIs. Built-in implementations: [`OllamaGateway`],
//! [`OpenAiGateway`] (feature `openai`), and [`MockGateway`] for tests.
//!
//! No caching happens at this layer; shared-context reuse across progressive
//! calls is the strategy controller's concern. The gateway's job is one call:
//! prompts in, content and token counts out, or a typed [`ProviderError`].

pub mod backoff;
pub mod mock;
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use backoff::BackoffConfig;
pub use mock::{MockGateway, MockReply};
pub use ollama::OllamaGateway;
#[cfg(feature = "openai")]
pub use openai::OpenAiGateway;

use crate::error::{AnnotateError, ProviderError, Result};
use crate::interview::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the callback invoked before each transport retry.
///
/// Arguments: `(attempt_number_about_to_run, delay_before_retry, reason)`.
pub type RetryCallback<'a> = Option<&'a mut (dyn FnMut(u32, Duration, &str) + Send)>;

/// Explicit provider configuration, passed to gateway calls.
///
/// Constructed once by the caller; there is no process-wide provider state.
/// The credential is forwarded, never stored anywhere else.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider (e.g. `http://localhost:11434`).
    pub base_url: String,
    /// Model identifier (e.g. `"llama3.2:3b"`, `"gpt-4o-mini"`).
    pub model: String,
    /// Credential forwarded to the provider, if it needs one.
    pub api_key: Option<String>,
    /// Per-call timeout. A call exceeding it fails as
    /// [`ProviderError::Timeout`] and is retried under the same attempt
    /// budget as any other transient failure.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Create a config for a provider at `base_url` using `model`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Set the forwarded credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What a gateway can guarantee about its output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCapability {
    /// Returns plain text; the caller extracts and repairs JSON itself and
    /// runs the correction loop on validation failure.
    PlainText,
    /// Enforces the response shape provider-side, short-circuiting the
    /// correction loop.
    StructuredOutput,
}

/// A normalized provider request.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// System instruction. For progressive runs this is the shared context,
    /// byte-identical across calls so provider-side caching can discount it.
    pub system: String,
    /// The task-specific user content.
    pub user: String,
    /// Sampling temperature, clamped to `[0, 1]` by the gateway.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
    /// Response shape hint (a JSON Schema). Structured-output gateways
    /// enforce it; plain-text gateways ignore it.
    pub response_shape: Option<Value>,
}

/// A normalized provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The generated text content.
    pub content: String,
    /// Prompt/completion token counts, when the provider reports them.
    pub usage: Option<TokenUsage>,
}

/// Abstraction over LLM providers.
///
/// Implementors translate the normalized request into the provider's HTTP
/// API and map failures onto [`ProviderError`]. Selected once at
/// construction time; object-safe and used as `Arc<dyn ProviderGateway>`.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Execute one call. No retry here; see [`with_backoff`].
    async fn send(
        &self,
        client: &Client,
        config: &ProviderConfig,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// What this gateway guarantees about output shape.
    fn capability(&self) -> OutputCapability;

    /// Human-readable name for metadata and events.
    fn name(&self) -> &'static str;
}

/// Per-call accounting accumulated by [`with_backoff`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CallStats {
    /// Attempts actually made (1 = first attempt succeeded).
    pub attempts: u32,
    /// Total time slept in backoff delays.
    pub backoff_total: Duration,
}

/// Execute a gateway call with transport-level retry and exponential backoff.
///
/// Transient failures (rate limit, timeout, network) are retried until the
/// attempt budget in `backoff` is spent; non-transient failures (auth,
/// schema rejection) return immediately. `stats` accumulates attempts and
/// sleep time for [`ProcessingMetadata`](crate::interview::ProcessingMetadata).
///
/// Honors `Retry-After` delays from rate-limit errors when the config says
/// to, and checks `cancel` before each attempt and after each sleep.
pub async fn with_backoff(
    gateway: &Arc<dyn ProviderGateway>,
    client: &Client,
    config: &ProviderConfig,
    request: &ProviderRequest,
    backoff: &BackoffConfig,
    cancel: Option<&AtomicBool>,
    stats: &mut CallStats,
    mut on_retry: RetryCallback<'_>,
) -> Result<ProviderResponse> {
    let max_attempts = backoff.max_attempts.max(1);
    let mut last_error: Option<ProviderError> = None;

    for attempt in 1..=max_attempts {
        if cancelled(cancel) {
            return Err(AnnotateError::Cancelled);
        }

        if attempt > 1 {
            let delay = match &last_error {
                Some(ProviderError::RateLimited {
                    retry_after: Some(ra),
                    ..
                }) if backoff.respect_retry_after => *ra,
                _ => backoff.delay_for_retry(attempt - 2),
            };

            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            if let Some(ref mut cb) = on_retry {
                cb(attempt, delay, &reason);
            }

            stats.backoff_total += delay;
            tokio::time::sleep(delay).await;

            if cancelled(cancel) {
                return Err(AnnotateError::Cancelled);
            }
        }

        stats.attempts = attempt;
        match gateway.send(client, config, request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                if attempt < max_attempts && e.is_transient() {
                    last_error = Some(e);
                    continue;
                }
                return Err(AnnotateError::Provider(e));
            }
        }
    }

    // Unreachable: the loop always returns on its final attempt.
    Err(AnnotateError::Provider(last_error.unwrap_or(
        ProviderError::Network("backoff loop exited unexpectedly".into()),
    )))
}

fn cancelled(cancel: Option<&AtomicBool>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Parse a `Retry-After` header value as whole seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
