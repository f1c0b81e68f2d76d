//! In-memory per-rule diagnostics for configuration errors found at dispatch.
//!
//! A rule whose stored condition no longer compiles, whose template fails to
//! render, or whose jobs cannot be enqueued keeps working for everyone else;
//! the problem is recorded here so the rule owner can see it. Entries are
//! capped per rule with FIFO eviction.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default per-rule entry cap.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

impl DiagnosticLevel {
    pub fn as_severity(&self) -> u8 {
        match self {
            DiagnosticLevel::Warning => 1,
            DiagnosticLevel::Error => 2,
        }
    }
}

/// What went wrong.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Stored condition failed to compile; the rule was skipped.
    InvalidCondition,
    /// Template failed; the default payload was sent instead.
    PayloadTemplate,
    /// The delivery queue refused the job.
    EnqueueFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub timestamp: DateTime<Utc>,
    pub rule_id: Uuid,
    pub level: DiagnosticLevel,
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

/// Query parameters for [`Diagnostics::query`].
#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticQuery {
    /// Minimum level (inclusive).
    pub level: Option<DiagnosticLevel>,
    pub kind: Option<DiagnosticKind>,
    pub limit: Option<u32>,
    /// Only entries at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Per-rule diagnostics buffer, shared by the dispatcher and the service.
#[derive(Clone)]
pub struct Diagnostics {
    entries: Arc<RwLock<HashMap<Uuid, VecDeque<Diagnostic>>>>,
    max_entries_per_rule: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            max_entries_per_rule: max.max(1),
        }
    }

    pub fn record(
        &self,
        rule_id: Uuid,
        timestamp: DateTime<Utc>,
        level: DiagnosticLevel,
        kind: DiagnosticKind,
        message: impl Into<String>,
        record_id: Option<&str>,
    ) {
        let entry = Diagnostic {
            timestamp,
            rule_id,
            level,
            kind,
            message: message.into(),
            record_id: record_id.map(str::to_string),
        };

        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let deque = guard.entry(rule_id).or_default();
        deque.push_back(entry);
        while deque.len() > self.max_entries_per_rule {
            deque.pop_front();
        }
    }

    /// Entries for a rule, newest first.
    pub fn query(&self, rule_id: Uuid, params: &DiagnosticQuery) -> Vec<Diagnostic> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(deque) = guard.get(&rule_id) else {
            return Vec::new();
        };

        let min_severity = params.level.map(|l| l.as_severity()).unwrap_or(0);
        let limit = params.limit.unwrap_or(100) as usize;

        deque
            .iter()
            .rev()
            .filter(|d| d.level.as_severity() >= min_severity)
            .filter(|d| params.kind.map_or(true, |k| d.kind == k))
            .filter(|d| params.since.map_or(true, |s| d.timestamp >= s))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop everything recorded for a rule (on delete).
    pub fn clear(&self, rule_id: Uuid) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        guard.remove(&rule_id);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_with_fifo_eviction() {
        let diag = Diagnostics::with_max_entries(3);
        let rule = Uuid::new_v4();
        for i in 1..=4 {
            diag.record(
                rule,
                Utc::now(),
                DiagnosticLevel::Warning,
                DiagnosticKind::PayloadTemplate,
                format!("msg {i}"),
                None,
            );
        }
        let entries = diag.query(rule, &DiagnosticQuery::default());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "msg 4");
        assert_eq!(entries[2].message, "msg 2");
    }

    #[test]
    fn filters_by_level_and_kind() {
        let diag = Diagnostics::new();
        let rule = Uuid::new_v4();
        diag.record(rule, Utc::now(), DiagnosticLevel::Warning, DiagnosticKind::PayloadTemplate, "tpl", Some("r1"));
        diag.record(rule, Utc::now(), DiagnosticLevel::Error, DiagnosticKind::InvalidCondition, "cond", Some("r2"));
        diag.record(rule, Utc::now(), DiagnosticLevel::Error, DiagnosticKind::EnqueueFailed, "full", Some("r3"));

        let errors = diag.query(
            rule,
            &DiagnosticQuery {
                level: Some(DiagnosticLevel::Error),
                ..Default::default()
            },
        );
        assert_eq!(errors.len(), 2);

        let enqueue = diag.query(
            rule,
            &DiagnosticQuery {
                kind: Some(DiagnosticKind::EnqueueFailed),
                ..Default::default()
            },
        );
        assert_eq!(enqueue.len(), 1);
        assert_eq!(enqueue[0].record_id.as_deref(), Some("r3"));

        let limited = diag.query(
            rule,
            &DiagnosticQuery {
                limit: Some(1),
                ..Default::default()
            },
        );
        assert_eq!(limited[0].message, "full");
    }

    #[test]
    fn rules_are_isolated_and_clearable() {
        let diag = Diagnostics::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        diag.record(a, Utc::now(), DiagnosticLevel::Error, DiagnosticKind::InvalidCondition, "a", None);
        diag.record(b, Utc::now(), DiagnosticLevel::Error, DiagnosticKind::InvalidCondition, "b", None);
        diag.clear(a);
        assert!(diag.query(a, &DiagnosticQuery::default()).is_empty());
        assert_eq!(diag.query(b, &DiagnosticQuery::default()).len(), 1);
    }

    #[test]
    fn since_uses_recorded_timestamps() {
        let diag = Diagnostics::new();
        let rule = Uuid::new_v4();
        let t0 = Utc::now();
        let later = t0 + chrono::Duration::minutes(5);
        diag.record(rule, t0, DiagnosticLevel::Error, DiagnosticKind::InvalidCondition, "old", None);
        diag.record(rule, later, DiagnosticLevel::Error, DiagnosticKind::InvalidCondition, "new", None);

        let recent = diag.query(
            rule,
            &DiagnosticQuery {
                since: Some(later),
                ..Default::default()
            },
        );
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "new");
        assert_eq!(recent[0].timestamp, later);
    }
}
