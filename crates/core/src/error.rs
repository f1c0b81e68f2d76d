use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid record event: {0}")]
    InvalidEvent(String),

    #[error("Unknown outcome '{0}'")]
    UnknownOutcome(String),

    #[error("Unknown trigger '{0}'")]
    UnknownTrigger(String),

    #[error("{0}")]
    Other(String),
}
