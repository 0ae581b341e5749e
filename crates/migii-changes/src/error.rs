use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangeError {
    /// The backing store cannot open a native stream for this collection.
    #[error("change stream unavailable for {collection}: {reason}")]
    StreamUnavailable { collection: String, reason: String },

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub type Result<T> = std::result::Result<T, ChangeError>;
