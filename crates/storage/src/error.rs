use thiserror::Error;
use uuid::Uuid;

/// Errors from store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rule not found: {0}")]
    NotFound(Uuid),

    #[error("rule already exists: {0}")]
    Conflict(Uuid),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("schema catalog parse error: {0}")]
    Catalog(#[from] serde_yaml::Error),
}

impl StoreError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Corrupt(_) | Self::Database(_) | Self::Migrate(_) | Self::Catalog(_) => 500,
        }
    }
}
