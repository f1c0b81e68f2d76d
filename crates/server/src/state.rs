use std::sync::Arc;

use recordhook_engine::{Engine, EventPublisher, RuleService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RuleService>,
    pub publisher: EventPublisher,
}

impl AppState {
    pub fn from_engine(engine: &Engine) -> Arc<Self> {
        Arc::new(Self {
            service: engine.service.clone(),
            publisher: engine.publisher.clone(),
        })
    }
}
