//! Trigger dispatcher: record events in, delivery jobs out.
//!
//! For every event the dispatcher loads the enabled rules of the event's
//! entity, evaluates each rule whose trigger matches and enqueues one
//! [`DeliveryJob`] per match. It never waits on the network: enqueue is
//! non-blocking and delivery happens in the worker pool.
//!
//! A rule that cannot be evaluated (stored condition no longer compiles) is
//! skipped and recorded in [`Diagnostics`]; the other rules of the event are
//! unaffected.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use recordhook_core::RecordEvent;
use recordhook_notify::{Clock, DeliveryJob, EnqueueError, JobQueue};
use recordhook_rules::diagnostics::{DiagnosticKind, DiagnosticLevel, Diagnostics};
use recordhook_rules::payload::{PayloadContext, PayloadRenderer, RuleMeta};
use recordhook_rules::{evaluate, Rule};
use recordhook_storage::RuleStore;

use crate::error::EngineError;

// ── Summary ─────────────────────────────────────────────────────────

/// What happened to one record event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    /// Enabled rules whose trigger matched the event kind.
    pub considered: usize,
    /// Rules whose condition matched.
    pub matched: usize,
    /// Job ids handed to the delivery queue.
    pub enqueued: Vec<Uuid>,
    pub skipped: Vec<SkippedRule>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRule {
    pub rule_id: Uuid,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    InvalidCondition(String),
    QueueFull,
    QueueClosed,
}

// ── Dispatcher ──────────────────────────────────────────────────────

pub struct TriggerDispatcher {
    rules: Arc<dyn RuleStore>,
    queue: Arc<dyn JobQueue>,
    diagnostics: Diagnostics,
    renderer: PayloadRenderer,
    clock: Arc<dyn Clock>,
}

impl TriggerDispatcher {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        queue: Arc<dyn JobQueue>,
        diagnostics: Diagnostics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            rules,
            queue,
            diagnostics,
            renderer: PayloadRenderer::new(),
            clock,
        }
    }

    /// Fan one record event out to the matching rules.
    ///
    /// A failed rule fetch means no rule fires for this event; the error is
    /// logged and an empty summary returned.
    pub async fn on_record_event(&self, event: &RecordEvent) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        if let Err(e) = event.check() {
            warn!(error = %e, "dropping malformed record event");
            return summary;
        }

        let rules = match self.rules.enabled_for(&event.tenant_id, &event.entity_slug).await {
            Ok(rules) => rules,
            Err(e) => {
                error!(
                    tenant_id = %event.tenant_id,
                    entity = %event.entity_slug,
                    record_id = %event.record_id,
                    error = %e,
                    "failed to load rules, no rules fired"
                );
                return summary;
            }
        };

        let triggered_at = self.clock.now();
        for rule in rules.iter().filter(|r| r.trigger.fires_on(event.kind)) {
            summary.considered += 1;

            let condition = match rule.compiled_condition() {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        tenant_id = %rule.tenant_id,
                        error = %e,
                        "skipping rule with invalid stored condition"
                    );
                    self.diagnostics.record(
                        rule.id,
                        triggered_at,
                        DiagnosticLevel::Error,
                        DiagnosticKind::InvalidCondition,
                        e.to_string(),
                        Some(&event.record_id),
                    );
                    summary.skipped.push(SkippedRule {
                        rule_id: rule.id,
                        reason: SkipReason::InvalidCondition(e.to_string()),
                    });
                    continue;
                }
            };

            if !evaluate(&condition, &event.new_fields, event.previous_fields.as_ref()) {
                continue;
            }
            summary.matched += 1;

            let job = self.build_job(rule, event, triggered_at);
            let job_id = job.job_id;
            match self.queue.enqueue(job) {
                Ok(()) => {
                    debug!(rule_id = %rule.id, %job_id, record_id = %event.record_id, "job enqueued");
                    summary.enqueued.push(job_id);
                }
                Err(e) => {
                    warn!(rule_id = %rule.id, record_id = %event.record_id, error = %e, "failed to enqueue delivery job");
                    self.diagnostics.record(
                        rule.id,
                        triggered_at,
                        DiagnosticLevel::Error,
                        DiagnosticKind::EnqueueFailed,
                        e.to_string(),
                        Some(&event.record_id),
                    );
                    summary.skipped.push(SkippedRule {
                        rule_id: rule.id,
                        reason: match e {
                            EnqueueError::QueueFull => SkipReason::QueueFull,
                            EnqueueError::Closed => SkipReason::QueueClosed,
                        },
                    });
                }
            }
        }

        debug!(
            tenant_id = %event.tenant_id,
            entity = %event.entity_slug,
            record_id = %event.record_id,
            event = %event.kind,
            considered = summary.considered,
            matched = summary.matched,
            enqueued = summary.enqueued.len(),
            "record event dispatched"
        );
        summary
    }

    /// Snapshot everything the worker needs, so later edits to the rule do
    /// not affect this delivery.
    fn build_job(&self, rule: &Rule, event: &RecordEvent, triggered_at: chrono::DateTime<chrono::Utc>) -> DeliveryJob {
        let ctx = PayloadContext::new(RuleMeta::from(rule), event, triggered_at);
        let (payload, template_error) = self
            .renderer
            .resolve(rule.webhook_payload_template.as_deref(), &ctx);
        if let Some(e) = template_error {
            warn!(rule_id = %rule.id, error = %e, "payload template failed, sending default payload");
            self.diagnostics.record(
                rule.id,
                triggered_at,
                DiagnosticLevel::Warning,
                DiagnosticKind::PayloadTemplate,
                e.to_string(),
                Some(&event.record_id),
            );
        }

        DeliveryJob {
            job_id: Uuid::new_v4(),
            tenant_id: rule.tenant_id.clone(),
            rule_id: rule.id,
            record_id: event.record_id.clone(),
            trigger_event: event.kind,
            webhook_url: rule.webhook_url.clone(),
            webhook_headers: rule.webhook_headers.clone(),
            payload,
            attempt_count: 0,
            enqueued_at: triggered_at,
        }
    }

    /// Consume record events until the channel closes or `shutdown` fires.
    /// On shutdown, events already in the channel are still dispatched.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RecordEvent>, mut shutdown: oneshot::Receiver<()>) {
        info!("trigger dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        self.on_record_event(&event).await;
                    }
                    break;
                }
                next = rx.recv() => match next {
                    Some(event) => {
                        self.on_record_event(&event).await;
                    }
                    None => break,
                },
            }
        }
        info!("trigger dispatcher stopped");
    }
}

// ── Publisher ───────────────────────────────────────────────────────

/// Sender side of the record-event channel, held by the storage layer.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<RecordEvent>,
}

impl EventPublisher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RecordEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Publish a committed mutation. Waits for channel capacity.
    pub async fn publish(&self, event: RecordEvent) -> Result<(), EngineError> {
        event.check()?;
        self.tx
            .send(event)
            .await
            .map_err(|_| EngineError::DispatcherStopped)
    }
}
