//! Mock gateway for testing without a live provider.
//!
//! [`MockGateway`] returns pre-scripted replies in order, including typed
//! [`ProviderError`]s, so transport retry and correction behavior are
//! testable deterministically. It also records every request it receives
//! for assertions on prompt content.

use super::{OutputCapability, ProviderConfig, ProviderGateway, ProviderRequest, ProviderResponse};
use crate::error::ProviderError;
use crate::interview::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful content with usage counts.
    Content {
        /// The canned response text.
        text: String,
        /// Token usage reported with the reply.
        usage: TokenUsage,
    },
    /// A typed failure.
    Fail(ProviderError),
}

impl MockReply {
    /// Successful content with default usage counts.
    pub fn content(text: impl Into<String>) -> Self {
        MockReply::Content {
            text: text.into(),
            usage: TokenUsage::new(100, 20),
        }
    }

    /// A typed failure.
    pub fn fail(error: ProviderError) -> Self {
        MockReply::Fail(error)
    }

    /// Shorthand for a 429 with no Retry-After.
    pub fn rate_limited() -> Self {
        MockReply::Fail(ProviderError::RateLimited {
            retry_after: None,
            message: "rate limited".into(),
        })
    }
}

/// A test gateway that replays scripted replies in order.
///
/// Cycles back to the beginning when the script is exhausted. For
/// assertions on what was sent, use [`take_requests`](Self::take_requests).
pub struct MockGateway {
    replies: Vec<MockReply>,
    index: AtomicUsize,
    capability: OutputCapability,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl MockGateway {
    /// Create a mock that replays `replies` in order, cycling.
    pub fn script(replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "MockGateway requires at least one reply");
        Self {
            replies,
            index: AtomicUsize::new(0),
            capability: OutputCapability::PlainText,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same content.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::script(vec![MockReply::content(text)])
    }

    /// Advertise a different output capability.
    pub fn with_capability(mut self, capability: OutputCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Drain the recorded requests, in call order.
    pub fn take_requests(&self) -> Vec<ProviderRequest> {
        match self.requests.lock() {
            Ok(mut reqs) => std::mem::take(&mut *reqs),
            Err(_) => Vec::new(),
        }
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }

    fn next_reply(&self) -> MockReply {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        self.replies[idx].clone()
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn send(
        &self,
        _client: &Client,
        _config: &ProviderConfig,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut reqs) = self.requests.lock() {
            reqs.push(request.clone());
        }
        match self.next_reply() {
            MockReply::Content { text, usage } => Ok(ProviderResponse {
                content: text,
                usage: Some(usage),
            }),
            MockReply::Fail(error) => Err(error),
        }
    }

    fn capability(&self) -> OutputCapability {
        self.capability
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
