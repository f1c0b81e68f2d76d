//! Trigger dispatch, rule testing and the rule service facade.
//!
//! [`Engine::start`] wires the stores, the delivery worker pool and the
//! dispatcher task together; the HTTP server and the integration tests
//! both go through it.

pub mod dispatcher;
pub mod error;
pub mod runtime;
pub mod service;
pub mod tester;

pub use dispatcher::{DispatchSummary, EventPublisher, SkipReason, SkippedRule, TriggerDispatcher};
pub use error::EngineError;
pub use runtime::{Engine, Stores};
pub use service::{RuleService, SavedRule};
pub use tester::{RuleTester, TestDelivery, TestRuleRequest, TestRuleResponse};
