use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The transport could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The open transport failed while reading.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
