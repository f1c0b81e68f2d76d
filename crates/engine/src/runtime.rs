//! Engine assembly and lifecycle.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use recordhook_core::config::{DeliveryConfig, DispatchConfig};
use recordhook_notify::{Clock, DeliveryWorker, WebhookSender, WebhookTransport, WorkerSettings};
use recordhook_rules::diagnostics::Diagnostics;
use recordhook_storage::{
    DeliveryLogStore, MemoryDeliveryLog, MemoryRuleStore, MemorySchemaCatalog, RuleStore, SchemaCatalog,
};

use crate::dispatcher::{EventPublisher, TriggerDispatcher};
use crate::service::RuleService;
use crate::tester::RuleTester;

/// The three stores the engine reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub rules: Arc<dyn RuleStore>,
    pub log: Arc<dyn DeliveryLogStore>,
    pub catalog: Arc<dyn SchemaCatalog>,
}

impl Stores {
    /// Process-local stores for development and tests.
    pub fn in_memory(catalog: MemorySchemaCatalog) -> Self {
        Self {
            rules: Arc::new(MemoryRuleStore::new()),
            log: Arc::new(MemoryDeliveryLog::new()),
            catalog: Arc::new(catalog),
        }
    }
}

/// A running engine: dispatcher task plus delivery worker pool.
pub struct Engine {
    pub service: Arc<RuleService>,
    pub publisher: EventPublisher,
    pub dispatcher: Arc<TriggerDispatcher>,
    dispatch_shutdown: Option<oneshot::Sender<()>>,
    dispatch_task: JoinHandle<()>,
    worker: DeliveryWorker,
}

impl Engine {
    /// Start the worker pool and the dispatcher task. Must be called inside
    /// a tokio runtime.
    pub fn start(
        delivery: &DeliveryConfig,
        dispatch: &DispatchConfig,
        stores: Stores,
        transport: Arc<dyn WebhookTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let settings = WorkerSettings::from_config(delivery);
        let (queue, worker) = DeliveryWorker::spawn(
            settings.clone(),
            transport.clone(),
            stores.log.clone(),
            clock.clone(),
        );

        let diagnostics = Diagnostics::with_max_entries(dispatch.diagnostics_per_rule);
        let dispatcher = Arc::new(TriggerDispatcher::new(
            stores.rules.clone(),
            Arc::new(queue),
            diagnostics.clone(),
            clock.clone(),
        ));

        let (publisher, events) = EventPublisher::channel(dispatch.event_queue_capacity);
        let (dispatch_shutdown, shutdown_rx) = oneshot::channel();
        let dispatch_task = tokio::spawn(dispatcher.clone().run(events, shutdown_rx));

        let tester = RuleTester::new(WebhookSender::new(
            transport,
            clock.clone(),
            settings.timeout,
            settings.excerpt_limit,
        ));
        let service = Arc::new(RuleService::new(
            stores.rules,
            stores.log,
            stores.catalog,
            diagnostics,
            tester,
            clock,
        ));

        info!("engine started");
        Self {
            service,
            publisher,
            dispatcher,
            dispatch_shutdown: Some(dispatch_shutdown),
            dispatch_task,
            worker,
        }
    }

    /// Dispatch every event already published, then deliver every job
    /// already queued, then stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.dispatch_shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.dispatch_task).await {
            error!(error = %e, "dispatcher task failed");
        }
        self.worker.shutdown().await;
        info!("engine stopped");
    }
}
