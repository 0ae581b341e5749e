//! `migii-changes`: turns store mutations into a sequence of [`ChangeEvent`]s.
//!
//! When the store reports native change-stream support, one stream per
//! watched collection is relayed as-is. Otherwise, or when opening a stream
//! fails, the source falls back to polling the most recently updated records
//! on a fixed interval and emits each batch as a synthetic `update`.
//!
//! [`ChangeEvent`]: migii_protocol::ChangeEvent

pub mod error;
pub mod feed;
pub mod source;

pub use error::{ChangeError, Result};
pub use feed::{ChangeFeed, ChangeStream};
pub use source::{Armed, ChangeSource, ChangeSourceConfig};
