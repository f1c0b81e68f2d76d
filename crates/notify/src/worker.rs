//! Delivery worker pool.
//!
//! Jobs arrive through a bounded queue. Each job runs in its own task and
//! walks the retry state machine; attempts within a job are sequential.
//! Two semaphores bound the pool:
//! - job slots (`max_in_flight_jobs`), held for the whole job including backoff
//! - connection permits (`max_concurrency`), held only during the HTTP call
//!
//! Every attempt appends exactly one delivery log entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use recordhook_core::config::DeliveryConfig;
use recordhook_core::{DeliveryLogEntry, RecordEventKind};
use recordhook_storage::DeliveryLogStore;

use crate::clock::Clock;
use crate::retry::{DeliveryState, RetryPolicy};
use crate::sender::{AttemptReport, WebhookSender};
use crate::traits::WebhookTransport;

// ── Jobs and queue ──────────────────────────────────────────────────

/// One matched rule for one record event, with everything needed to
/// deliver it snapshotted at enqueue time.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryJob {
    pub job_id: Uuid,
    pub tenant_id: String,
    pub rule_id: Uuid,
    pub record_id: String,
    pub trigger_event: RecordEventKind,
    pub webhook_url: String,
    #[serde(skip)]
    pub webhook_headers: BTreeMap<String, String>,
    pub payload: serde_json::Value,
    /// Attempts made so far.
    pub attempt_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Why a job could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("delivery queue is full")]
    QueueFull,

    #[error("delivery queue is closed")]
    Closed,
}

/// Producer side of the delivery queue. Enqueue never waits.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: DeliveryJob) -> Result<(), EnqueueError>;
}

#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    tx: mpsc::Sender<DeliveryJob>,
}

impl JobQueue for DeliveryQueue {
    fn enqueue(&self, job: DeliveryJob) -> Result<(), EnqueueError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

// ── Settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub policy: RetryPolicy,
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub max_in_flight_jobs: usize,
    pub queue_capacity: usize,
    pub excerpt_limit: usize,
}

impl WorkerSettings {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(config),
            timeout: config.timeout(),
            max_concurrency: config.max_concurrency.max(1),
            max_in_flight_jobs: config.max_in_flight_jobs.max(1),
            queue_capacity: config.queue_capacity.max(1),
            excerpt_limit: config.response_excerpt_bytes,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

// ── Worker ──────────────────────────────────────────────────────────

struct WorkerContext {
    policy: RetryPolicy,
    sender: WebhookSender,
    log: Arc<dyn DeliveryLogStore>,
    clock: Arc<dyn Clock>,
    connections: Semaphore,
}

/// Handle to the running pool.
pub struct DeliveryWorker {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl DeliveryWorker {
    /// Start the pool. Returns the queue to hand to producers.
    pub fn spawn(
        settings: WorkerSettings,
        transport: Arc<dyn WebhookTransport>,
        log: Arc<dyn DeliveryLogStore>,
        clock: Arc<dyn Clock>,
    ) -> (DeliveryQueue, DeliveryWorker) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let ctx = Arc::new(WorkerContext {
            policy: settings.policy,
            sender: WebhookSender::new(transport, clock.clone(), settings.timeout, settings.excerpt_limit),
            log,
            clock,
            connections: Semaphore::new(settings.max_concurrency),
        });
        let job_slots = Arc::new(Semaphore::new(settings.max_in_flight_jobs));

        info!(
            queue_capacity = settings.queue_capacity,
            max_concurrency = settings.max_concurrency,
            max_in_flight_jobs = settings.max_in_flight_jobs,
            max_attempts = settings.policy.max_attempts,
            "delivery worker started"
        );

        let handle = tokio::spawn(run(rx, ctx, job_slots, shutdown_rx));
        (
            DeliveryQueue { tx },
            DeliveryWorker {
                shutdown_tx: Some(shutdown_tx),
                handle,
            },
        )
    }

    /// Close the queue, deliver what is already queued and wait for every
    /// in-flight job to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            error!(error = %e, "delivery worker task failed");
        }
        info!("delivery worker stopped");
    }
}

async fn run(
    mut rx: mpsc::Receiver<DeliveryJob>,
    ctx: Arc<WorkerContext>,
    job_slots: Arc<Semaphore>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut jobs = JoinSet::new();
    let mut closing = false;

    loop {
        // Take a slot before pulling, so queued jobs stay in the queue
        // (and count against its capacity) until they can start.
        let Ok(slot) = job_slots.clone().acquire_owned().await else {
            break;
        };

        let next = tokio::select! {
            biased;
            _ = &mut shutdown_rx, if !closing => {
                closing = true;
                rx.close();
                debug!("delivery queue closed, draining");
                continue;
            }
            job = rx.recv() => job,
        };
        let Some(job) = next else { break };

        let ctx = ctx.clone();
        jobs.spawn(async move {
            let _slot = slot;
            deliver_job(job, &ctx).await
        });

        while let Some(done) = jobs.try_join_next() {
            report_join(done);
        }
    }

    while let Some(done) = jobs.join_next().await {
        report_join(done);
    }
}

fn report_join(done: Result<DeliveryState, tokio::task::JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "delivery job task panicked");
    }
}

/// Run one job to a terminal state.
async fn deliver_job(mut job: DeliveryJob, ctx: &WorkerContext) -> DeliveryState {
    let mut state = DeliveryState::Pending;

    loop {
        state = state.begin_attempt();
        let DeliveryState::InFlight { attempt } = state else {
            break;
        };
        job.attempt_count = attempt;

        let report = {
            // Permit is released before any backoff.
            let _permit = ctx.connections.acquire().await.ok();
            ctx.sender
                .send(&job.webhook_url, &job.webhook_headers, &job.payload)
                .await
        };
        record_attempt(&job, attempt, &report, ctx).await;

        state = ctx.policy.transition(state, report.verdict);
        if state.is_terminal() {
            break;
        }
        if let DeliveryState::RetryWait { delay, next_attempt } = state {
            debug!(
                job_id = %job.job_id,
                rule_id = %job.rule_id,
                next_attempt,
                delay_ms = delay.as_millis() as u64,
                "delivery will be retried"
            );
            ctx.clock.sleep(delay).await;
        }
    }

    match state {
        DeliveryState::Succeeded { attempts } => info!(
            job_id = %job.job_id,
            rule_id = %job.rule_id,
            tenant_id = %job.tenant_id,
            attempts,
            "webhook delivered"
        ),
        DeliveryState::Failed { attempts } => warn!(
            job_id = %job.job_id,
            rule_id = %job.rule_id,
            tenant_id = %job.tenant_id,
            attempts,
            "webhook delivery failed"
        ),
        _ => {}
    }
    state
}

async fn record_attempt(job: &DeliveryJob, attempt: u32, report: &AttemptReport, ctx: &WorkerContext) {
    debug!(
        job_id = %job.job_id,
        rule_id = %job.rule_id,
        attempt,
        outcome = %report.outcome,
        status = ?report.http_status,
        duration_ms = report.duration_ms,
        "delivery attempt finished"
    );

    let entry = DeliveryLogEntry {
        id: Uuid::new_v4(),
        tenant_id: job.tenant_id.clone(),
        rule_id: job.rule_id,
        job_id: job.job_id,
        record_id: job.record_id.clone(),
        attempt_count: attempt,
        requested_at: report.requested_at,
        duration_ms: report.duration_ms,
        http_status: report.http_status,
        response_excerpt: report.response_excerpt.clone(),
        outcome: report.outcome,
        error: report.error.clone(),
    };
    if let Err(e) = ctx.log.append(&entry).await {
        error!(
            job_id = %job.job_id,
            rule_id = %job.rule_id,
            attempt,
            error = %e,
            "failed to append delivery log entry"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, ScriptedTransport};
    use recordhook_core::DeliveryOutcome;
    use recordhook_storage::{LogFilter, MemoryDeliveryLog};
    use serde_json::json;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        log: Arc<MemoryDeliveryLog>,
        queue: DeliveryQueue,
        worker: DeliveryWorker,
    }

    fn harness(script: Vec<Result<crate::WebhookResponse, crate::TransportError>>, settings: WorkerSettings) -> Harness {
        let transport = Arc::new(ScriptedTransport::new(script));
        let clock = Arc::new(ManualClock::new());
        let log = Arc::new(MemoryDeliveryLog::new());
        let (queue, worker) = DeliveryWorker::spawn(settings, transport.clone(), log.clone(), clock.clone());
        Harness {
            transport,
            clock,
            log,
            queue,
            worker,
        }
    }

    fn job(record_id: &str) -> DeliveryJob {
        DeliveryJob {
            job_id: Uuid::new_v4(),
            tenant_id: "acme".into(),
            rule_id: Uuid::new_v4(),
            record_id: record_id.into(),
            trigger_event: RecordEventKind::Create,
            webhook_url: "https://hooks.example.com/x".into(),
            webhook_headers: BTreeMap::from([("X-Token".to_string(), "abc".to_string())]),
            payload: json!({"record": {"priority": "high"}}),
            attempt_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    async fn outcomes(log: &MemoryDeliveryLog) -> Vec<(u32, DeliveryOutcome)> {
        log.all()
            .await
            .into_iter()
            .map(|e| (e.attempt_count, e.outcome))
            .collect()
    }

    #[tokio::test]
    async fn three_timeouts_write_three_entries() {
        let h = harness(
            vec![
                ScriptedTransport::timeout(),
                ScriptedTransport::timeout(),
                ScriptedTransport::timeout(),
                ScriptedTransport::status(200),
            ],
            WorkerSettings::default(),
        );
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;

        assert_eq!(
            outcomes(&h.log).await,
            vec![
                (1, DeliveryOutcome::Timeout),
                (2, DeliveryOutcome::Timeout),
                (3, DeliveryOutcome::Timeout)
            ]
        );
        assert_eq!(h.transport.calls(), 3);
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
        let entries = h.log.all().await;
        assert!(entries.iter().all(|e| e.http_status.is_none() && e.error.is_some()));
        assert!(entries.windows(2).all(|w| w[0].job_id == w[1].job_id));
    }

    #[tokio::test]
    async fn server_error_then_success() {
        let h = harness(
            vec![ScriptedTransport::status(500), ScriptedTransport::status(200)],
            WorkerSettings::default(),
        );
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;

        assert_eq!(
            outcomes(&h.log).await,
            vec![(1, DeliveryOutcome::HttpError), (2, DeliveryOutcome::Success)]
        );
        let entries = h.log.all().await;
        assert_eq!(entries[0].http_status, Some(500));
        assert_eq!(entries[1].http_status, Some(200));
        assert_eq!(entries[0].response_excerpt.as_deref(), Some("status 500"));
    }

    #[tokio::test]
    async fn network_errors_are_retried_with_backoff() {
        let h = harness(
            vec![
                ScriptedTransport::network("connection refused"),
                ScriptedTransport::network("connection reset"),
                ScriptedTransport::status(200),
            ],
            WorkerSettings::default(),
        );
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;

        assert_eq!(
            outcomes(&h.log).await,
            vec![
                (1, DeliveryOutcome::NetworkError),
                (2, DeliveryOutcome::NetworkError),
                (3, DeliveryOutcome::Success)
            ]
        );
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2), Duration::from_secs(4)]);
        let entries = h.log.all().await;
        assert_eq!(entries[0].http_status, None);
        assert!(entries[0].error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(entries[2].http_status, Some(200));
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let h = harness(vec![ScriptedTransport::status(404)], WorkerSettings::default());
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;

        assert_eq!(outcomes(&h.log).await, vec![(1, DeliveryOutcome::HttpError)]);
        assert!(h.clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn redirect_is_a_permanent_http_error() {
        let h = harness(vec![ScriptedTransport::status(302)], WorkerSettings::default());
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;
        assert_eq!(outcomes(&h.log).await, vec![(1, DeliveryOutcome::HttpError)]);
    }

    #[tokio::test]
    async fn rate_limit_honours_retry_after() {
        let h = harness(
            vec![
                ScriptedTransport::status_retry_after(429, "7"),
                ScriptedTransport::status_retry_after(429, "86400"),
                ScriptedTransport::status(200),
            ],
            WorkerSettings::default(),
        );
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;

        assert_eq!(
            h.clock.sleeps(),
            vec![Duration::from_secs(7), Duration::from_secs(120)]
        );
        assert_eq!(
            outcomes(&h.log).await,
            vec![
                (1, DeliveryOutcome::HttpError),
                (2, DeliveryOutcome::HttpError),
                (3, DeliveryOutcome::Success)
            ]
        );
    }

    #[tokio::test]
    async fn rate_limit_without_header_uses_backoff() {
        let h = harness(
            vec![ScriptedTransport::status(429), ScriptedTransport::status(200)],
            WorkerSettings::default(),
        );
        h.queue.enqueue(job("rec-1")).unwrap();
        h.worker.shutdown().await;
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2)]);
    }

    #[tokio::test]
    async fn unresolvable_header_is_logged_once() {
        let h = harness(vec![], WorkerSettings::default());
        let mut j = job("rec-1");
        j.webhook_headers
            .insert("Authorization".into(), "Bearer ${RH_DEFINITELY_UNSET_VAR}".into());
        h.queue.enqueue(j).unwrap();
        h.worker.shutdown().await;

        let entries = h.log.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, DeliveryOutcome::NetworkError);
        assert!(entries[0].error.as_deref().unwrap().contains("RH_DEFINITELY_UNSET_VAR"));
        assert_eq!(h.transport.calls(), 0);
    }

    #[tokio::test]
    async fn request_carries_payload_and_headers() {
        let h = harness(vec![], WorkerSettings::default());
        h.queue.enqueue(job("rec-9")).unwrap();
        h.worker.shutdown().await;

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://hooks.example.com/x");
        assert_eq!(requests[0].headers["X-Token"], "abc");
        assert_eq!(requests[0].body["record"]["priority"], json!("high"));
        assert_eq!(requests[0].timeout, Duration::from_secs(10));
        assert_eq!(requests[0].excerpt_limit, 1024);
    }

    #[tokio::test]
    async fn full_queue_reports_backpressure() {
        let settings = WorkerSettings {
            queue_capacity: 1,
            max_in_flight_jobs: 1,
            ..WorkerSettings::default()
        };
        let h = harness(vec![], settings);
        // The worker cannot run until the test yields, so the queue fills.
        let mut refused = None;
        for i in 0..64 {
            if let Err(e) = h.queue.enqueue(job(&format!("rec-{i}"))) {
                refused = Some(e);
                break;
            }
        }
        assert_eq!(refused, Some(EnqueueError::QueueFull));
        h.worker.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_rejects() {
        let h = harness(vec![], WorkerSettings::default());
        for i in 0..5 {
            h.queue.enqueue(job(&format!("rec-{i}"))).unwrap();
        }
        let queue = h.queue.clone();
        h.worker.shutdown().await;

        assert_eq!(h.log.len().await, 5);
        let page = h.log.query(&LogFilter::for_tenant("acme")).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(queue.enqueue(job("late")), Err(EnqueueError::Closed));
    }
}
