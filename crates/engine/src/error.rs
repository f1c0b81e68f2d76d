use thiserror::Error;
use uuid::Uuid;

use recordhook_core::CoreError;
use recordhook_rules::validation::ValidationResult;
use recordhook_rules::ConditionError;
use recordhook_storage::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("validation failed: {}", .0.reason().unwrap_or_default())]
    Validation(ValidationResult),

    #[error("rule not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    InvalidCondition(#[from] ConditionError),

    #[error(transparent)]
    InvalidEvent(#[from] CoreError),

    #[error("{0}")]
    BadRequest(String),

    #[error("event dispatcher is not running")]
    DispatcherStopped,
}

impl EngineError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Store(e) => e.status_code(),
            Self::Validation(_) | Self::InvalidCondition(_) | Self::InvalidEvent(_) | Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::DispatcherStopped => 503,
        }
    }
}
