use std::time::Duration;
use thiserror::Error;

/// Typed failure from a provider gateway call.
///
/// Returned by [`ProviderGateway`](crate::gateway::ProviderGateway)
/// implementations. Transient variants are retried under the transport
/// backoff budget; the rest fail the interview immediately.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// The provider returned 429. `retry_after` is populated from the
    /// `Retry-After` response header when present.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
        /// Response body text.
        message: String,
    },

    /// The per-call timeout elapsed before the provider responded.
    #[error("provider call timed out")]
    Timeout,

    /// Authentication or credential failure (401/403). Never retried.
    #[error("provider auth failed: {0}")]
    Auth(String),

    /// Connection failure or 5xx server error.
    #[error("provider network error: {0}")]
    Network(String),

    /// The provider rejected the request or response shape (structured-output
    /// backends). Never retried at the transport layer.
    #[error("provider rejected schema: {0}")]
    SchemaRejected(String),
}

impl ProviderError {
    /// Whether this failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Timeout | ProviderError::Network(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// Errors produced by the annotator and its components.
#[derive(Error, Debug)]
pub enum AnnotateError {
    /// A provider gateway call failed after exhausting its retry budget
    /// (or immediately, for non-transient failures).
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),

    /// JSON (de)serialization failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema definition itself is malformed.
    #[error("invalid schema definition: {0}")]
    Schema(String),

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled via the cancellation flag.
    #[error("annotation run was cancelled")]
    Cancelled,

    /// A terminal per-interview failure, tagged with the stage it died in.
    /// Batch processing reports these without aborting sibling interviews.
    #[error("annotation of '{interview_id}' failed during {stage}: {source}")]
    RunFailed {
        /// Id of the interview whose run failed.
        interview_id: String,
        /// The stage the failure occurred in.
        stage: RunStage,
        /// The underlying failure.
        #[source]
        source: Box<AnnotateError>,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

/// The stage of an annotation run, used to tag terminal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    /// Splitting the transcript into turns.
    Segmenting,
    /// Executing fill calls (monolithic or progressive).
    Filling,
    /// Executing corrective calls after validation failure.
    Correcting,
    /// Flattening a completed annotation into records.
    Extracting,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Segmenting => "segmenting",
            RunStage::Filling => "filling",
            RunStage::Correcting => "correcting",
            RunStage::Extracting => "extracting",
        };
        f.write_str(name)
    }
}

impl From<anyhow::Error> for AnnotateError {
    fn from(err: anyhow::Error) -> Self {
        AnnotateError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnnotateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_transient() {
        let err = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
            message: "slow down".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        assert!(ProviderError::Timeout.is_transient());
    }

    #[test]
    fn test_auth_is_not_transient() {
        assert!(!ProviderError::Auth("bad key".into()).is_transient());
    }

    #[test]
    fn test_schema_rejected_is_not_transient() {
        assert!(!ProviderError::SchemaRejected("no additionalProperties".into()).is_transient());
    }

    #[test]
    fn test_run_failed_carries_interview_and_stage() {
        let err = AnnotateError::RunFailed {
            interview_id: "int-007".into(),
            stage: RunStage::Filling,
            source: Box::new(AnnotateError::Provider(ProviderError::Timeout)),
        };
        let msg = err.to_string();
        assert!(msg.contains("int-007"));
        assert!(msg.contains("filling"));
    }
}
