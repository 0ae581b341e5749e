use std::sync::Arc;

use dashmap::DashMap;
use migii_protocol::ChangeEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// One connected realtime client as seen by the hub.
pub trait ClientSocket: Send + Sync {
    fn is_open(&self) -> bool;

    /// Queue `payload` for delivery. Returns `false` if it was not accepted.
    fn send_text(&self, payload: Arc<str>) -> bool;
}

/// Socket handle backed by the connection's writer task.
pub struct ChannelSocket {
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelSocket {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }
}

impl ClientSocket for ChannelSocket {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send_text(&self, payload: Arc<str>) -> bool {
        match self.tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("client writer buffer full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Registry of open realtime connections.
///
/// Every change event is serialized once and written to each open socket.
/// No queueing and no retry: a client that is closed or slow misses it.
#[derive(Default)]
pub struct BroadcastHub {
    clients: DashMap<String, Arc<dyn ClientSocket>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `id`. Returns `true` if an existing handle was replaced.
    pub fn add_client(&self, id: impl Into<String>, socket: Arc<dyn ClientSocket>) -> bool {
        self.clients.insert(id.into(), socket).is_some()
    }

    /// Remove `id` if present. Removing an unknown id is a no-op.
    pub fn remove_client(&self, id: &str) -> bool {
        self.clients.remove(id).is_some()
    }

    /// Add `socket` under `id` and return a guard that removes it on drop.
    pub fn register(self: &Arc<Self>, id: impl Into<String>, socket: Arc<dyn ClientSocket>) -> Registration {
        let id = id.into();
        self.add_client(id.clone(), socket.clone());
        Registration {
            hub: Arc::clone(self),
            id,
            socket,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Push `event` to every open client. Returns how many accepted it.
    pub fn broadcast(&self, event: &ChangeEvent) -> usize {
        let payload: Arc<str> = match serde_json::to_string(&event.to_message()) {
            Ok(s) => s.into(),
            Err(e) => {
                warn!(collection = %event.collection, error = %e, "change event not serializable, skipped");
                return 0;
            }
        };

        let mut delivered = 0;
        for entry in self.clients.iter() {
            let socket = entry.value();
            if socket.is_open() && socket.send_text(Arc::clone(&payload)) {
                delivered += 1;
            }
        }
        debug!(
            collection = %event.collection,
            operation = %event.operation,
            delivered,
            clients = self.clients.len(),
            "change broadcast"
        );
        delivered
    }

    /// Drop every registration. Used at shutdown.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

/// Removes its connection from the hub when dropped, unless the id has since
/// been taken over by a different handle.
pub struct Registration {
    hub: Arc<BroadcastHub>,
    id: String,
    socket: Arc<dyn ClientSocket>,
}

impl Registration {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.clients.remove_if(&self.id, |_, current| {
            std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(&self.socket))
        });
    }
}
