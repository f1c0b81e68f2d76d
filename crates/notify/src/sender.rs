//! One delivery attempt: resolve headers, POST, classify.
//!
//! Shared by the worker pool (which logs and retries) and the rule tester
//! (which does neither).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use recordhook_core::DeliveryOutcome;

use crate::clock::Clock;
use crate::retry::{classify_status, parse_retry_after, AttemptVerdict};
use crate::traits::{TransportError, WebhookRequest, WebhookTransport};
use crate::webhook::resolve_headers;

/// Result of a single attempt, ready to be logged or returned inline.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub requested_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: DeliveryOutcome,
    pub http_status: Option<u16>,
    pub response_excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub verdict: AttemptVerdict,
}

#[derive(Clone)]
pub struct WebhookSender {
    transport: Arc<dyn WebhookTransport>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    excerpt_limit: usize,
}

impl WebhookSender {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
        excerpt_limit: usize,
    ) -> Self {
        Self {
            transport,
            clock,
            timeout,
            excerpt_limit,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// POST `payload` to `url` once.
    pub async fn send(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        payload: &serde_json::Value,
    ) -> AttemptReport {
        let requested_at = self.clock.now();

        let result = match resolve_headers(headers) {
            Ok(headers) => {
                let request = WebhookRequest {
                    url: url.to_string(),
                    headers,
                    body: payload.clone(),
                    timeout: self.timeout,
                    excerpt_limit: self.excerpt_limit,
                };
                self.transport.post(&request).await
            }
            Err(e) => Err(TransportError::InvalidRequest(e.to_string())),
        };

        let duration_ms = u64::try_from((self.clock.now() - requested_at).num_milliseconds()).unwrap_or(0);

        match result {
            Ok(response) => {
                let retry_after = response
                    .retry_after
                    .as_deref()
                    .and_then(|v| parse_retry_after(v, self.clock.now()));
                let verdict = classify_status(response.status, retry_after);
                AttemptReport {
                    requested_at,
                    duration_ms,
                    outcome: if verdict == AttemptVerdict::Success {
                        DeliveryOutcome::Success
                    } else {
                        DeliveryOutcome::HttpError
                    },
                    http_status: Some(response.status),
                    response_excerpt: Some(response.body_excerpt),
                    error: None,
                    verdict,
                }
            }
            Err(e) => {
                let (outcome, verdict) = match e {
                    TransportError::Timeout(_) => (
                        DeliveryOutcome::Timeout,
                        AttemptVerdict::Retryable { retry_after: None },
                    ),
                    TransportError::Network(_) => (
                        DeliveryOutcome::NetworkError,
                        AttemptVerdict::Retryable { retry_after: None },
                    ),
                    TransportError::InvalidRequest(_) => {
                        (DeliveryOutcome::NetworkError, AttemptVerdict::Permanent)
                    }
                };
                AttemptReport {
                    requested_at,
                    duration_ms,
                    outcome,
                    http_status: None,
                    response_excerpt: None,
                    error: Some(e.to_string()),
                    verdict,
                }
            }
        }
    }
}
