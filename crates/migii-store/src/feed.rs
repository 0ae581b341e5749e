use std::sync::Arc;

use async_trait::async_trait;
use migii_changes::{ChangeError, ChangeFeed, ChangeStream};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{Store, JOBS, WORKERS};

/// [`ChangeFeed`] over the SQLite store.
///
/// SQLite has no server-side change streams, so "native" here means the
/// in-process [`ChangeJournal`](crate::ChangeJournal). Whether it is offered
/// is decided by `database.change_streams`.
pub struct SqliteChangeFeed {
    store: Arc<Store>,
    native: bool,
}

impl SqliteChangeFeed {
    pub fn new(store: Arc<Store>, native: bool) -> Self {
        Self { store, native }
    }
}

#[async_trait]
impl ChangeFeed for SqliteChangeFeed {
    async fn supports_change_streams(&self) -> bool {
        self.native
    }

    async fn open_stream(&self, collection: &str) -> migii_changes::Result<ChangeStream> {
        if !self.native {
            return Err(ChangeError::StreamUnavailable {
                collection: collection.to_string(),
                reason: "change streams disabled".into(),
            });
        }
        match collection {
            WORKERS | JOBS => Ok(self.store.journal().subscribe(collection)),
            other => Err(ChangeError::UnknownCollection(other.to_string())),
        }
    }

    async fn recent_updates(&self, collection: &str, limit: usize) -> migii_changes::Result<Vec<Value>> {
        self.store
            .recent_updates(collection, limit)
            .map_err(|e| match e {
                StoreError::NotFound { id, .. } => ChangeError::UnknownCollection(id),
                other => ChangeError::Query(other.to_string()),
            })
    }
}
