use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use migii_protocol::ChangeEvent;
use serde_json::Value;

use crate::error::Result;

/// Native change feed for one collection.
pub type ChangeStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// Storage-side seam the change source reads from.
///
/// Implementations must be `Send + Sync` so one feed can be shared between
/// the change source task and HTTP handlers.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Topology probe: can this store deliver native change streams?
    async fn supports_change_streams(&self) -> bool;

    /// Open a stream of mutations on `collection`. Update events carry the
    /// full post-mutation document, not a diff.
    async fn open_stream(&self, collection: &str) -> Result<ChangeStream>;

    /// The `limit` most recently updated records, newest first.
    async fn recent_updates(&self, collection: &str, limit: usize) -> Result<Vec<Value>>;
}
