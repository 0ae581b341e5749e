use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("notification not found: {0}")]
    NotFound(String),

    /// The move is not part of the notification's lifecycle.
    #[error("invalid notification transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid input: {0}")]
    Invalid(String),

    /// The job posting side of a review failed.
    #[error(transparent)]
    Store(#[from] migii_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("notification store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, NotificationError>;
