//! Execution context shared across an annotator's runs.
//!
//! [`AnnotateCtx`] carries the HTTP client, the selected provider gateway
//! and its configuration, the transport backoff policy, the cancellation
//! handle, and the optional event handler. Constructed once and shared
//! read-only; all per-run mutable state lives on the run itself.

use crate::events::EventHandler;
use crate::gateway::{BackoffConfig, OllamaGateway, ProviderConfig, ProviderGateway};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared execution context for annotation runs.
///
/// The gateway is selected here, at construction time, from explicit
/// configuration. There is no runtime string dispatch and no process-wide
/// provider state.
pub struct AnnotateCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// The selected provider gateway. Default: [`OllamaGateway`].
    pub gateway: Arc<dyn ProviderGateway>,
    /// Provider endpoint, model, credential, and per-call timeout.
    pub provider: ProviderConfig,
    /// Transport retry policy. Default: [`BackoffConfig::none()`].
    pub backoff: BackoffConfig,
    /// Optional cancellation flag, checked before each provider call.
    pub cancellation: Option<Arc<AtomicBool>>,
    /// Optional event handler for run lifecycle events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl AnnotateCtx {
    /// Create a new builder for the given provider configuration.
    pub fn builder(provider: ProviderConfig) -> AnnotateCtxBuilder {
        AnnotateCtxBuilder {
            client: None,
            gateway: None,
            provider,
            backoff: None,
            cancellation: None,
            event_handler: None,
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> crate::error::Result<()> {
        if self.is_cancelled() {
            return Err(crate::error::AnnotateError::Cancelled);
        }
        Ok(())
    }

    /// Get a reference to the cancellation flag, if set.
    pub fn cancel_flag(&self) -> Option<&AtomicBool> {
        self.cancellation.as_deref()
    }
}

impl std::fmt::Debug for AnnotateCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotateCtx")
            .field("gateway", &self.gateway.name())
            .field("provider", &self.provider.base_url)
            .field("model", &self.provider.model)
            .field("backoff", &self.backoff)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`AnnotateCtx`].
pub struct AnnotateCtxBuilder {
    client: Option<Client>,
    gateway: Option<Arc<dyn ProviderGateway>>,
    provider: ProviderConfig,
    backoff: Option<BackoffConfig>,
    cancellation: Option<Arc<AtomicBool>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl AnnotateCtxBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the provider gateway. Default: [`OllamaGateway`].
    pub fn gateway(mut self, gateway: Arc<dyn ProviderGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Use the OpenAI-compatible gateway. The credential comes from the
    /// provider config's `api_key`.
    #[cfg(feature = "openai")]
    pub fn openai(mut self) -> Self {
        self.gateway = Some(Arc::new(crate::gateway::OpenAiGateway::new()));
        self
    }

    /// Set the transport retry policy. Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the context.
    pub fn build(self) -> AnnotateCtx {
        let client = self.client.unwrap_or_else(|| {
            Client::builder()
                .timeout(self.provider.timeout)
                .build()
                .expect("Failed to build HTTP client")
        });
        AnnotateCtx {
            client,
            gateway: self.gateway.unwrap_or_else(|| Arc::new(OllamaGateway)),
            provider: self.provider,
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            cancellation: self.cancellation,
            event_handler: self.event_handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gateway_is_ollama() {
        let ctx = AnnotateCtx::builder(ProviderConfig::new("http://localhost:11434", "m")).build();
        assert_eq!(ctx.gateway.name(), "ollama");
    }

    #[test]
    fn test_cancellation_flag() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = AnnotateCtx::builder(ProviderConfig::new("http://localhost:11434", "m"))
            .cancellation(Some(cancel.clone()))
            .build();
        assert!(ctx.check_cancelled().is_ok());
        cancel.store(true, Ordering::Relaxed);
        assert!(ctx.check_cancelled().is_err());
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_openai_builder() {
        let ctx = AnnotateCtx::builder(
            ProviderConfig::new("https://api.openai.com", "gpt-4o-mini").with_api_key("sk-test"),
        )
        .openai()
        .build();
        assert_eq!(ctx.gateway.name(), "openai");
    }
}
