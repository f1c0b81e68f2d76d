//! Delivery log filters, pages and read-time statistics.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use recordhook_core::{DeliveryLogEntry, DeliveryOutcome};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const DEFAULT_RECENT_FAILURES: usize = 10;

/// Filter for [`crate::DeliveryLogStore::query`].
///
/// `tenant_id` is always applied; the API fills it from the request scope,
/// never from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    #[serde(skip)]
    pub tenant_id: String,
    pub rule_id: Option<Uuid>,
    pub record_id: Option<String>,
    pub outcome: Option<DeliveryOutcome>,
    /// Inclusive lower bound on `requested_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `requested_at`.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl LogFilter {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Default::default()
        }
    }

    /// Page size after defaulting and clamping to `1..=MAX_PAGE_SIZE`.
    pub fn page_size(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn page_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, entry: &DeliveryLogEntry) -> bool {
        entry.tenant_id == self.tenant_id
            && self.rule_id.map_or(true, |id| entry.rule_id == id)
            && self
                .record_id
                .as_deref()
                .map_or(true, |r| entry.record_id == r)
            && self.outcome.map_or(true, |o| entry.outcome == o)
            && self.from.map_or(true, |from| entry.requested_at >= from)
            && self.to.map_or(true, |to| entry.requested_at < to)
    }
}

/// One page of log entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub entries: Vec<DeliveryLogEntry>,
    /// Matching entries across all pages.
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u32>,
}

impl LogPage {
    pub fn new(entries: Vec<DeliveryLogEntry>, total: u64, filter: &LogFilter) -> Self {
        let end = u64::from(filter.page_offset()) + entries.len() as u64;
        let next_offset = (end < total).then(|| u32::try_from(end).unwrap_or(u32::MAX));
        Self {
            entries,
            total,
            next_offset,
        }
    }
}

/// Attempt counts for one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleStats {
    pub rule_id: Uuid,
    pub success_count: u64,
    pub failure_count: u64,
    /// `success_count / (success_count + failure_count)`.
    pub success_rate: f64,
    pub last_attempt_at: DateTime<Utc>,
}

impl RuleStats {
    pub fn new(rule_id: Uuid, success_count: u64, failure_count: u64, last_attempt_at: DateTime<Utc>) -> Self {
        let total = success_count + failure_count;
        let success_rate = if total == 0 {
            0.0
        } else {
            success_count as f64 / total as f64
        };
        Self {
            rule_id,
            success_count,
            failure_count,
            success_rate,
            last_attempt_at,
        }
    }
}

/// Delivery statistics for a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub tenant_id: String,
    /// Most recently attempted rule first.
    pub rules: Vec<RuleStats>,
    /// Latest failed attempts across all rules, newest first.
    pub recent_failures: Vec<DeliveryLogEntry>,
}

/// Aggregate stats from raw entries. Entries of other tenants are ignored.
pub fn aggregate<'a>(
    tenant_id: &str,
    entries: impl IntoIterator<Item = &'a DeliveryLogEntry>,
    recent_failures: usize,
) -> DeliveryStats {
    let mut per_rule: HashMap<Uuid, (u64, u64, DateTime<Utc>)> = HashMap::new();
    let mut failures: Vec<&DeliveryLogEntry> = Vec::new();

    for entry in entries.into_iter().filter(|e| e.tenant_id == tenant_id) {
        let slot = per_rule
            .entry(entry.rule_id)
            .or_insert((0, 0, entry.requested_at));
        if entry.outcome.is_success() {
            slot.0 += 1;
        } else {
            slot.1 += 1;
            failures.push(entry);
        }
        slot.2 = slot.2.max(entry.requested_at);
    }

    let mut rules: Vec<RuleStats> = per_rule
        .into_iter()
        .map(|(id, (ok, failed, last))| RuleStats::new(id, ok, failed, last))
        .collect();
    rules.sort_by(|a, b| {
        b.last_attempt_at
            .cmp(&a.last_attempt_at)
            .then(a.rule_id.cmp(&b.rule_id))
    });

    failures.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
    let recent_failures = failures
        .into_iter()
        .take(recent_failures)
        .cloned()
        .collect();

    DeliveryStats {
        tenant_id: tenant_id.to_string(),
        rules,
        recent_failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(tenant: &str, rule: Uuid, outcome: DeliveryOutcome, minutes_ago: i64) -> DeliveryLogEntry {
        DeliveryLogEntry {
            id: Uuid::new_v4(),
            tenant_id: tenant.into(),
            rule_id: rule,
            job_id: Uuid::new_v4(),
            record_id: "rec-1".into(),
            attempt_count: 1,
            requested_at: Utc::now() - Duration::minutes(minutes_ago),
            duration_ms: 12,
            http_status: None,
            response_excerpt: None,
            outcome,
            error: None,
        }
    }

    #[test]
    fn page_size_is_clamped() {
        let mut f = LogFilter::for_tenant("t");
        assert_eq!(f.page_size(), 50);
        f.limit = Some(10_000);
        assert_eq!(f.page_size(), 500);
        f.limit = Some(0);
        assert_eq!(f.page_size(), 1);
    }

    #[test]
    fn filter_time_range_is_half_open() {
        let rule = Uuid::new_v4();
        let e = entry("t", rule, DeliveryOutcome::Success, 5);
        let mut f = LogFilter::for_tenant("t");
        f.from = Some(e.requested_at);
        assert!(f.matches(&e));
        f.to = Some(e.requested_at);
        assert!(!f.matches(&e));
    }

    #[test]
    fn filter_is_tenant_scoped() {
        let e = entry("other", Uuid::new_v4(), DeliveryOutcome::Success, 1);
        assert!(!LogFilter::for_tenant("t").matches(&e));
    }

    #[test]
    fn next_offset_only_when_more_remain() {
        let mut f = LogFilter::for_tenant("t");
        f.limit = Some(2);
        let two = vec![
            entry("t", Uuid::nil(), DeliveryOutcome::Success, 1),
            entry("t", Uuid::nil(), DeliveryOutcome::Success, 2),
        ];
        assert_eq!(LogPage::new(two.clone(), 5, &f).next_offset, Some(2));
        f.offset = Some(3);
        assert_eq!(LogPage::new(two, 5, &f).next_offset, None);
    }

    #[test]
    fn aggregate_counts_and_rates() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let entries = vec![
            entry("t", a, DeliveryOutcome::Timeout, 30),
            entry("t", a, DeliveryOutcome::Success, 20),
            entry("t", a, DeliveryOutcome::Success, 10),
            entry("t", b, DeliveryOutcome::HttpError, 40),
            entry("other", b, DeliveryOutcome::Success, 1),
        ];
        let stats = aggregate("t", &entries, 10);
        assert_eq!(stats.rules.len(), 2);
        let ra = &stats.rules[0];
        assert_eq!(ra.rule_id, a);
        assert_eq!((ra.success_count, ra.failure_count), (2, 1));
        assert!((ra.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(ra.last_attempt_at, entries[2].requested_at);
        let rb = &stats.rules[1];
        assert_eq!((rb.success_count, rb.failure_count), (0, 1));
        assert_eq!(rb.success_rate, 0.0);

        assert_eq!(stats.recent_failures.len(), 2);
        assert_eq!(stats.recent_failures[0].outcome, DeliveryOutcome::Timeout);
    }

    #[test]
    fn recent_failures_are_capped() {
        let rule = Uuid::new_v4();
        let entries: Vec<_> = (0..15)
            .map(|i| entry("t", rule, DeliveryOutcome::NetworkError, i))
            .collect();
        let stats = aggregate("t", &entries, DEFAULT_RECENT_FAILURES);
        assert_eq!(stats.recent_failures.len(), 10);
        assert_eq!(stats.recent_failures[0].requested_at, entries[0].requested_at);
    }
}
