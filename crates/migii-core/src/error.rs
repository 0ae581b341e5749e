use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigiiError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("WebSocket protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigiiError {
    /// Short error code string, used in logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            MigiiError::Config(_) => "CONFIG_ERROR",
            MigiiError::Validation(_) => "VALIDATION_ERROR",
            MigiiError::NotFound { .. } => "NOT_FOUND",
            MigiiError::Conflict(_) => "CONFLICT",
            MigiiError::Database(_) => "DATABASE_ERROR",
            MigiiError::Protocol(_) => "PROTOCOL_ERROR",
            MigiiError::Serialization(_) => "SERIALIZATION_ERROR",
            MigiiError::Io(_) => "IO_ERROR",
            MigiiError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            MigiiError::RateLimited { .. } => "RATE_LIMITED",
            MigiiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, MigiiError>;
