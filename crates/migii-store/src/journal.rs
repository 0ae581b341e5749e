use futures_util::StreamExt;
use migii_changes::ChangeStream;
use migii_protocol::ChangeEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

const JOURNAL_CAPACITY: usize = 256;

/// In-process change stream for the store's collections.
///
/// Writes publish here after they commit. Events published while nobody is
/// subscribed are dropped, and a subscriber that falls more than
/// `JOURNAL_CAPACITY` events behind skips ahead (no replay).
#[derive(Clone)]
pub struct ChangeJournal {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeJournal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(JOURNAL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Stream of events for one collection, starting now.
    pub fn subscribe(&self, collection: &str) -> ChangeStream {
        let collection = collection.to_string();
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| {
                let wanted = match item {
                    Ok(ev) if ev.collection == collection => Some(ev),
                    Ok(_) => None,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(collection = %collection, skipped, "change stream lagged");
                        None
                    }
                };
                async move { wanted }
            })
            .boxed()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeJournal {
    fn default() -> Self {
        Self::new()
    }
}
