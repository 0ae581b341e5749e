//! Wire types shared by the gateway and the realtime client.

pub mod frames;
pub mod http;

pub use frames::{ChangeEvent, ChangeMessage, OperationKind};
pub use http::{ErrorBody, HealthResponse};

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unexpected frame type: {0}")]
    UnexpectedFrame(String),
}
