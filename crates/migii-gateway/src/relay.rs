//! Background tasks that feed the broadcast hub.
//!
//! Store changes arrive from the [`ChangeSource`] over an mpsc channel;
//! notification updates arrive from the [`NotificationGateway`] subscription
//! and are republished as `notifications` change events.
//!
//! [`NotificationGateway`]: migii_notifications::NotificationGateway

use std::sync::Arc;

use migii_changes::{ChangeSource, ChangeSourceConfig};
use migii_core::Scheduler;
use migii_notifications::NotificationUpdate;
use migii_protocol::{ChangeEvent, OperationKind};
use migii_store::SqliteChangeFeed;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::ws::hub::BroadcastHub;

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Wire form of a notification update on the realtime socket.
pub fn notification_event(update: &NotificationUpdate) -> ChangeEvent {
    match update {
        NotificationUpdate::Created(n) => ChangeEvent::new(
            NOTIFICATIONS_COLLECTION,
            OperationKind::Insert,
            serde_json::to_value(n).unwrap_or_else(|_| json!({ "id": n.id })),
        ),
        NotificationUpdate::StatusChanged {
            id,
            status,
            updated_at,
        } => ChangeEvent::new(
            NOTIFICATIONS_COLLECTION,
            OperationKind::Update,
            json!({ "id": id, "status": status, "updated_at": updated_at }),
        ),
    }
}

/// Start the change source and the two relays. All three stop when
/// `shutdown` flips to `true`.
pub fn spawn_pipeline(
    state: &Arc<AppState>,
    scheduler: Arc<dyn Scheduler>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let feed = Arc::new(SqliteChangeFeed::new(
        state.store.clone(),
        state.config.database.change_streams,
    ));
    let source = ChangeSource::new(
        feed,
        ChangeSourceConfig::from(&state.config.realtime),
        scheduler,
    );
    let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);

    let source_shutdown = shutdown.clone();
    let source_task = tokio::spawn(async move {
        source.run(tx, source_shutdown).await;
    });
    let changes_task = tokio::spawn(relay_changes(rx, state.hub.clone()));
    let notifications_task = tokio::spawn(relay_notifications(
        state.notifications.subscribe(),
        state.hub.clone(),
        shutdown,
    ));

    vec![source_task, changes_task, notifications_task]
}

/// Broadcast every change until the source hangs up.
pub async fn relay_changes(mut rx: mpsc::Receiver<ChangeEvent>, hub: Arc<BroadcastHub>) {
    while let Some(event) = rx.recv().await {
        hub.broadcast(&event);
    }
    debug!("change relay stopped");
}

pub async fn relay_notifications(
    mut rx: broadcast::Receiver<NotificationUpdate>,
    hub: Arc<BroadcastHub>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            update = rx.recv() => match update {
                Ok(update) => {
                    hub.broadcast(&notification_event(&update));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("notification relay stopped");
}
