//! Transport trait definition and shared error types.

use std::collections::BTreeMap;
use std::time::Duration;

/// Errors raised while building delivery components.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A fully resolved outbound request.
///
/// `headers` already have `${VAR}` references substituted; never log them.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub timeout: Duration,
    /// Maximum number of response body bytes to keep.
    pub excerpt_limit: usize,
}

/// What came back from the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookResponse {
    pub status: u16,
    /// Response body cut to the request's `excerpt_limit`.
    pub body_excerpt: String,
    /// Raw `Retry-After` header value, if present.
    pub retry_after: Option<String>,
}

/// Why an attempt produced no HTTP response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    /// The request could not be built (bad URL, unresolvable header).
    /// Retrying cannot fix it.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// HTTP seam of the delivery worker.
#[async_trait::async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Perform exactly one POST. Never follows redirects.
    async fn post(&self, request: &WebhookRequest) -> Result<WebhookResponse, TransportError>;
}
