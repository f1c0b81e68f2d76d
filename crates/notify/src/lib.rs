//! Outbound webhook delivery for matched rules.
//!
//! This crate provides:
//! - `WebhookTransport` trait for the HTTP call, with a reqwest implementation
//! - A pure retry state machine (`RetryPolicy`, `DeliveryState`)
//! - A `Clock` abstraction so backoff can be tested without sleeping
//! - The delivery worker pool: bounded job queue, concurrency limits,
//!   one log entry per attempt, graceful shutdown
//! - Scripted test doubles behind the `testing` feature

pub mod clock;
pub mod retry;
pub mod sender;
pub mod traits;
pub mod webhook;
pub mod worker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use retry::{AttemptVerdict, DeliveryState, RetryPolicy};
pub use sender::{AttemptReport, WebhookSender};
pub use traits::{NotifyError, TransportError, WebhookRequest, WebhookResponse, WebhookTransport};
pub use webhook::ReqwestTransport;
pub use worker::{DeliveryJob, DeliveryQueue, DeliveryWorker, EnqueueError, JobQueue, WorkerSettings};
