//! Retry policy and the per-job delivery state machine.
//!
//! Transitions are pure functions of the current state, the verdict of the
//! last attempt and the policy, so every path can be tested without I/O.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use recordhook_core::config::DeliveryConfig;

/// How an attempt should influence the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    Success,
    /// Try again, optionally no sooner than the server asked.
    Retryable { retry_after: Option<Duration> },
    Permanent,
}

/// Lifecycle of one delivery job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    InFlight { attempt: u32 },
    RetryWait { next_attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Failed { attempts: u32 },
}

impl DeliveryState {
    /// Move to the next attempt. Terminal and in-flight states are unchanged.
    pub fn begin_attempt(self) -> Self {
        match self {
            DeliveryState::Pending => DeliveryState::InFlight { attempt: 1 },
            DeliveryState::RetryWait { next_attempt, .. } => DeliveryState::InFlight {
                attempt: next_attempt,
            },
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Succeeded { .. } | DeliveryState::Failed { .. })
    }
}

/// Attempt limit and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Upper bound applied to server-supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }

    /// Delay after failed attempt number `attempt` (1-based): base doubling, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.backoff_base.saturating_mul(1u32 << exp);
        delay.min(self.backoff_cap)
    }

    /// Apply an attempt verdict to an in-flight job.
    pub fn transition(&self, state: DeliveryState, verdict: AttemptVerdict) -> DeliveryState {
        let DeliveryState::InFlight { attempt } = state else {
            return state;
        };
        match verdict {
            AttemptVerdict::Success => DeliveryState::Succeeded { attempts: attempt },
            AttemptVerdict::Permanent => DeliveryState::Failed { attempts: attempt },
            AttemptVerdict::Retryable { .. } if attempt >= self.max_attempts => {
                DeliveryState::Failed { attempts: attempt }
            }
            AttemptVerdict::Retryable { retry_after } => DeliveryState::RetryWait {
                next_attempt: attempt + 1,
                delay: retry_after
                    .map(|d| d.min(self.max_retry_after))
                    .unwrap_or_else(|| self.backoff(attempt)),
            },
        }
    }
}

/// Classify an HTTP status: 2xx success, 5xx and 429 retryable, the rest permanent.
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> AttemptVerdict {
    match status {
        200..=299 => AttemptVerdict::Success,
        429 => AttemptVerdict::Retryable { retry_after },
        500..=599 => AttemptVerdict::Retryable { retry_after: None },
        _ => AttemptVerdict::Permanent,
    }
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP date.
///
/// Dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(policy: &RetryPolicy, verdicts: &[AttemptVerdict]) -> (DeliveryState, Vec<Duration>) {
        let mut state = DeliveryState::Pending;
        let mut delays = Vec::new();
        for verdict in verdicts {
            state = state.begin_attempt();
            state = policy.transition(state, *verdict);
            match state {
                DeliveryState::RetryWait { delay, .. } => delays.push(delay),
                _ => break,
            }
        }
        (state, delays)
    }

    const RETRY: AttemptVerdict = AttemptVerdict::Retryable { retry_after: None };

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(16));
        assert_eq!(p.backoff(5), Duration::from_secs(30));
        assert_eq!(p.backoff(64), Duration::from_secs(30));
    }

    #[test]
    fn three_retryable_failures_exhaust() {
        let (state, delays) = run(&RetryPolicy::default(), &[RETRY, RETRY, RETRY, RETRY]);
        assert_eq!(state, DeliveryState::Failed { attempts: 3 });
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[test]
    fn success_after_retry() {
        let (state, delays) = run(&RetryPolicy::default(), &[RETRY, AttemptVerdict::Success]);
        assert_eq!(state, DeliveryState::Succeeded { attempts: 2 });
        assert_eq!(delays.len(), 1);
    }

    #[test]
    fn permanent_failure_stops_immediately() {
        let (state, delays) = run(&RetryPolicy::default(), &[AttemptVerdict::Permanent, RETRY]);
        assert_eq!(state, DeliveryState::Failed { attempts: 1 });
        assert!(state.is_terminal());
        assert!(delays.is_empty());
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(DeliveryState::Succeeded { attempts: 1 }.is_terminal());
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(!DeliveryState::InFlight { attempt: 1 }.is_terminal());
        assert!(!DeliveryState::RetryWait {
            next_attempt: 2,
            delay: Duration::from_secs(2)
        }
        .is_terminal());
    }

    #[test]
    fn retry_after_is_honoured_and_clamped() {
        let p = RetryPolicy::default();
        let asked = AttemptVerdict::Retryable {
            retry_after: Some(Duration::from_secs(7)),
        };
        let (_, delays) = run(&p, &[asked, AttemptVerdict::Success]);
        assert_eq!(delays, vec![Duration::from_secs(7)]);

        let greedy = AttemptVerdict::Retryable {
            retry_after: Some(Duration::from_secs(3600)),
        };
        let (_, delays) = run(&p, &[greedy, AttemptVerdict::Success]);
        assert_eq!(delays, vec![Duration::from_secs(120)]);
    }

    #[test]
    fn single_attempt_policy_never_waits() {
        let p = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let (state, delays) = run(&p, &[RETRY]);
        assert_eq!(state, DeliveryState::Failed { attempts: 1 });
        assert!(delays.is_empty());
    }

    #[test]
    fn transition_ignores_non_inflight_states() {
        let p = RetryPolicy::default();
        let done = DeliveryState::Succeeded { attempts: 1 };
        assert_eq!(p.transition(done, RETRY), done);
        assert_eq!(p.transition(DeliveryState::Pending, RETRY), DeliveryState::Pending);
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200, None), AttemptVerdict::Success);
        assert_eq!(classify_status(204, None), AttemptVerdict::Success);
        assert_eq!(classify_status(301, None), AttemptVerdict::Permanent);
        assert_eq!(classify_status(404, None), AttemptVerdict::Permanent);
        assert_eq!(classify_status(500, None), RETRY);
        assert_eq!(classify_status(503, Some(Duration::from_secs(5))), RETRY);
        assert_eq!(
            classify_status(429, Some(Duration::from_secs(5))),
            AttemptVerdict::Retryable {
                retry_after: Some(Duration::from_secs(5))
            }
        );
    }

    #[test]
    fn retry_after_parsing() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_retry_after("30", now), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after(" 0 ", now), Some(Duration::ZERO));
        assert_eq!(
            parse_retry_after("Sun, 01 Mar 2026 12:00:45 GMT", now),
            Some(Duration::from_secs(45))
        );
        assert_eq!(
            parse_retry_after("Sun, 01 Mar 2026 11:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("-5", now), None);
    }
}
