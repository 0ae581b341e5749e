use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{NotificationError, Result};
use crate::gateway::NotificationGateway;
use crate::types::{DomainNotification, NotificationStatus, NotificationUpdate, StatusAction, Target};

/// Where the board sends status changes for confirmation.
pub trait StatusWriter: Send + Sync {
    /// Persist `action` and return the stored notification.
    fn write_status(&self, id: &str, action: StatusAction) -> Result<DomainNotification>;
}

impl StatusWriter for NotificationGateway {
    fn write_status(&self, id: &str, action: StatusAction) -> Result<DomainNotification> {
        self.apply(id, action)
    }
}

/// Local view of one recipient's notifications.
///
/// A status action changes the local entry only after the writer confirms
/// it. If the write fails, the entry keeps its previous status and the error
/// goes back to the caller.
pub struct NotificationBoard {
    target: Target,
    writer: Arc<dyn StatusWriter>,
    /// Newest first.
    entries: Vec<DomainNotification>,
}

impl NotificationBoard {
    pub fn new(target: Target, writer: Arc<dyn StatusWriter>) -> Self {
        Self {
            target,
            writer,
            entries: Vec::new(),
        }
    }

    /// Replace the local entries with a fresh listing, e.g. from
    /// [`NotificationGateway::list_for`].
    pub fn load(&mut self, mut entries: Vec<DomainNotification>) {
        entries.retain(|n| n.target == self.target);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.entries = entries;
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn entries(&self) -> &[DomainNotification] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&DomainNotification> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|n| n.status == NotificationStatus::Unread)
            .count()
    }

    pub fn mark_as_read(&mut self, id: &str) -> Result<&DomainNotification> {
        self.apply_action(id, StatusAction::MarkRead)
    }

    /// Send `action` to the writer and adopt the confirmed record.
    pub fn apply_action(&mut self, id: &str, action: StatusAction) -> Result<&DomainNotification> {
        let idx = self
            .entries
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| NotificationError::NotFound(id.to_string()))?;

        match self.writer.write_status(id, action) {
            Ok(confirmed) => {
                self.entries[idx] = confirmed;
                Ok(&self.entries[idx])
            }
            Err(e) => {
                warn!(notification_id = %id, ?action, error = %e, "status write failed, local state kept");
                Err(e)
            }
        }
    }

    /// Merge a live update. Last write wins on `updated_at`; stale updates
    /// and updates for other recipients are ignored. Returns whether the
    /// board changed.
    pub fn apply_update(&mut self, update: &NotificationUpdate) -> bool {
        match update {
            NotificationUpdate::Created(n) => {
                if n.target != self.target {
                    return false;
                }
                if let Some(existing) = self.entries.iter_mut().find(|e| e.id == n.id) {
                    if n.updated_at <= existing.updated_at {
                        return false;
                    }
                    *existing = n.clone();
                    return true;
                }
                let pos = self
                    .entries
                    .iter()
                    .position(|e| e.created_at <= n.created_at)
                    .unwrap_or(self.entries.len());
                self.entries.insert(pos, n.clone());
                true
            }
            NotificationUpdate::StatusChanged {
                id,
                status,
                updated_at,
            } => {
                let Some(entry) = self.entries.iter_mut().find(|e| &e.id == id) else {
                    return false;
                };
                if *updated_at <= entry.updated_at {
                    debug!(notification_id = %id, "stale status update ignored");
                    return false;
                }
                entry.status = *status;
                entry.updated_at = updated_at.clone();
                true
            }
        }
    }
}
