//! Gateway for Ollama's native API.
//!
//! [`OllamaGateway`] translates normalized [`ProviderRequest`]s into
//! Ollama's `/api/chat` endpoint. Plain-text capability: Ollama's `format`
//! option forces syntactically valid JSON but does not enforce the response
//! shape, so validation failures still go through the correction loop.

use super::{
    parse_retry_after, OutputCapability, ProviderConfig, ProviderGateway, ProviderRequest,
    ProviderResponse,
};
use crate::error::ProviderError;
use crate::interview::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Gateway for Ollama's native API.
///
/// Endpoint: `/api/chat`. Token usage is read from `prompt_eval_count` /
/// `eval_count` when Ollama reports them.
#[derive(Debug, Clone, Default)]
pub struct OllamaGateway;

impl OllamaGateway {
    fn build_body(config: &ProviderConfig, request: &ProviderRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        json!({
            "model": config.model,
            "messages": messages,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": request.temperature.clamp(0.0, 1.0),
                "num_predict": request.max_tokens,
            },
        })
    }

    fn map_status(status: u16, retry_after: Option<std::time::Duration>, body: String) -> ProviderError {
        match status {
            401 | 403 => ProviderError::Auth(body),
            408 => ProviderError::Timeout,
            429 => ProviderError::RateLimited {
                retry_after,
                message: body,
            },
            400..=499 => ProviderError::SchemaRejected(body),
            _ => ProviderError::Network(format!("HTTP {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl ProviderGateway for OllamaGateway {
    async fn send(
        &self,
        client: &Client,
        config: &ProviderConfig,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
        let body = Self::build_body(config, request);

        let resp = client
            .post(&url)
            .timeout(config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status.as_u16(), retry_after, text));
        }

        let payload: Value = resp.json().await.map_err(ProviderError::from)?;
        let content = payload
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let prompt = payload.get("prompt_eval_count").and_then(|v| v.as_u64());
        let completion = payload.get("eval_count").and_then(|v| v.as_u64());
        let usage = match (prompt, completion) {
            (Some(p), Some(c)) => Some(TokenUsage::new(p, c)),
            _ => None,
        };

        Ok(ProviderResponse { content, usage })
    }

    fn capability(&self) -> OutputCapability {
        OutputCapability::PlainText
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
