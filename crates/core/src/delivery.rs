//! Delivery log records: one immutable row per webhook attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Classified result of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The endpoint answered 2xx.
    Success,
    /// The endpoint answered with any non-2xx status.
    HttpError,
    /// The request failed before a response arrived.
    NetworkError,
    /// No response within the attempt timeout.
    Timeout,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::HttpError => "http_error",
            DeliveryOutcome::NetworkError => "network_error",
            DeliveryOutcome::Timeout => "timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeliveryOutcome::Success),
            "http_error" => Ok(DeliveryOutcome::HttpError),
            "network_error" => Ok(DeliveryOutcome::NetworkError),
            "timeout" => Ok(DeliveryOutcome::Timeout),
            other => Err(CoreError::UnknownOutcome(other.to_string())),
        }
    }
}

/// A single delivery attempt as recorded in the delivery log.
///
/// Retries of one job share `job_id`, `rule_id` and `record_id` and carry
/// an increasing `attempt_count` starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub rule_id: Uuid,
    pub job_id: Uuid,
    pub record_id: String,
    pub attempt_count: u32,
    pub requested_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// `None` when the attempt failed before any response.
    pub http_status: Option<u16>,
    pub response_excerpt: Option<String>,
    pub outcome: DeliveryOutcome,
    /// Transport failure description for network and timeout outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cut `body` to at most `limit` bytes without splitting a UTF-8 character.
///
/// NUL characters are dropped: PostgreSQL `TEXT` cannot store them.
pub fn truncate_excerpt(body: &str, limit: usize) -> String {
    let mut end = body.len().min(limit);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].chars().filter(|&c| c != '\0').collect()
}
