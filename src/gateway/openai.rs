//! Gateway for OpenAI-compatible APIs.
//!
//! [`OpenAiGateway`] covers OpenAI, vLLM, llama.cpp server, LM Studio,
//! Together AI, Groq, Mistral, Fireworks, and Ollama's `/v1/` endpoint.
//!
//! Structured-output capability: when the request carries a response shape,
//! the provider enforces it via `response_format: json_schema` and performs
//! its own internal repair, which short-circuits the correction loop.

use super::{
    parse_retry_after, OutputCapability, ProviderConfig, ProviderGateway, ProviderRequest,
    ProviderResponse,
};
use crate::error::ProviderError;
use crate::interview::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Gateway for any OpenAI-compatible API.
///
/// Endpoint: `/v1/chat/completions`. The credential from
/// [`ProviderConfig`] is forwarded as `Authorization: Bearer {key}`.
#[derive(Debug, Clone, Default)]
pub struct OpenAiGateway {
    organization: Option<String>,
}

impl OpenAiGateway {
    /// Create a gateway with no organization header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `OpenAI-Organization` header.
    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    fn build_body(config: &ProviderConfig, request: &ProviderRequest) -> Value {
        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": request.user}));

        let mut body = json!({
            "model": config.model,
            "messages": messages,
            "temperature": request.temperature.clamp(0.0, 1.0),
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        body["response_format"] = match &request.response_shape {
            Some(shape) => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "annotation",
                    "schema": shape,
                    "strict": true,
                },
            }),
            None => json!({"type": "json_object"}),
        };

        body
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
impl ProviderGateway for OpenAiGateway {
    async fn send(
        &self,
        client: &Client,
        config: &ProviderConfig,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/v1/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        let body = Self::build_body(config, request);

        let mut req = client.post(&url).timeout(config.timeout).json(&body);
        if let Some(ref key) = config.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }

        let resp = req.send().await.map_err(ProviderError::from)?;

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
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let usage = payload.get("usage").and_then(|u| {
            let prompt = u.get("prompt_tokens")?.as_u64()?;
            let completion = u.get("completion_tokens")?.as_u64()?;
            Some(TokenUsage::new(prompt, completion))
        });

        Ok(ProviderResponse { content, usage })
    }

    fn capability(&self) -> OutputCapability {
        OutputCapability::StructuredOutput
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(shape: Option<Value>) -> ProviderRequest {
        ProviderRequest {
            system: "sys".into(),
            user: "user".into(),
            temperature: 0.2,
            max_tokens: 1024,
            response_shape: shape,
        }
    }

    #[test]
    fn test_build_body_json_object_without_shape() {
        let config = ProviderConfig::new("https://api.openai.com", "gpt-4o-mini");
        let body = OpenAiGateway::build_body(&config, &request(None));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_build_body_json_schema_with_shape() {
        let config = ProviderConfig::new("https://api.openai.com", "gpt-4o-mini");
        let shape = json!({"type": "object", "properties": {}});
        let body = OpenAiGateway::build_body(&config, &request(Some(shape.clone())));
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["schema"], shape);
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_map_status_taxonomy() {
        assert!(matches!(
            OpenAiGateway::map_status(403, None, "forbidden".into()),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            OpenAiGateway::map_status(429, Some(std::time::Duration::from_secs(2)), "x".into()),
            ProviderError::RateLimited {
                retry_after: Some(_),
                ..
            }
        ));
        assert!(matches!(
            OpenAiGateway::map_status(500, None, "err".into()),
            ProviderError::Network(_)
        ));
    }

    #[test]
    fn test_capability_is_structured() {
        assert_eq!(
            OpenAiGateway::new().capability(),
            OutputCapability::StructuredOutput
        );
    }
}
