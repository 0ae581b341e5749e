use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, Result};

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Worker,
    Business,
    Admin,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Worker => write!(f, "worker"),
            Self::Business => write!(f, "business"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "worker" => Ok(Self::Worker),
            "business" => Ok(Self::Business),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown target kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    pub fn worker(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Worker,
            id: id.into(),
        }
    }

    pub fn business(id: impl Into<String>) -> Self {
        Self {
            kind: TargetKind::Business,
            id: id.into(),
        }
    }

    /// The shared admin inbox.
    pub fn admin() -> Self {
        Self {
            kind: TargetKind::Admin,
            id: "admin".to_string(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// What happened. Each variant carries only the fields it needs.
///
/// Wire: `{ "type": "job_alert", "job_id": "...", ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    /// A newly approved job matches the worker's skill.
    JobAlert {
        job_id: String,
        title: String,
        category: String,
    },
    /// A business posted a job that needs admin review.
    JobReview {
        job_id: String,
        business_id: String,
        title: String,
    },
    WorkerAssigned {
        job_id: String,
        business_id: String,
        title: String,
    },
    AssignmentUpdate { job_id: String, worker_id: String },
    SupportRequest {
        requester: Target,
        subject: String,
        body: String,
    },
}

impl NotificationKind {
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Self::JobAlert { .. } | Self::WorkerAssigned { .. } | Self::AssignmentUpdate { .. } => {
                Lifecycle::Read
            }
            Self::JobReview { .. } => Lifecycle::Decision,
            Self::SupportRequest { .. } => Lifecycle::Resolution,
        }
    }

    /// Tag stored alongside the payload for filtering.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::JobAlert { .. } => "job_alert",
            Self::JobReview { .. } => "job_review",
            Self::WorkerAssigned { .. } => "worker_assigned",
            Self::AssignmentUpdate { .. } => "assignment_update",
            Self::SupportRequest { .. } => "support_request",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
    Pending,
    Approved,
    Rejected,
    Resolved,
    Declined,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Resolved => "resolved",
            Self::Declined => "declined",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "unread" => Ok(Self::Unread),
            "read" => Ok(Self::Read),
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "resolved" => Ok(Self::Resolved),
            "declined" => Ok(Self::Declined),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// The status machine a notification kind follows. All moves are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `unread → read`
    Read,
    /// `pending → approved | rejected`
    Decision,
    /// `pending → resolved | declined`
    Resolution,
}

impl Lifecycle {
    pub fn initial(self) -> NotificationStatus {
        match self {
            Lifecycle::Read => NotificationStatus::Unread,
            Lifecycle::Decision | Lifecycle::Resolution => NotificationStatus::Pending,
        }
    }

    fn allows(self, from: NotificationStatus, to: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, from, to),
            (Lifecycle::Read, Unread, Read)
                | (Lifecycle::Decision, Pending, Approved | Rejected)
                | (Lifecycle::Resolution, Pending, Resolved | Declined)
        )
    }

    fn contains(self, status: NotificationStatus) -> bool {
        status == self.initial() || self.allows(self.initial(), status)
    }

    /// Validate `from → to`. Returns `Ok(false)` when the notification is
    /// already at `to`, so repeating a confirmed action is a no-op.
    pub fn check(self, from: NotificationStatus, to: NotificationStatus) -> Result<bool> {
        if from == to && self.contains(to) {
            return Ok(false);
        }
        if self.allows(from, to) {
            return Ok(true);
        }
        Err(NotificationError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// A status change a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusAction {
    MarkRead,
    Approve,
    Reject,
    Resolve,
    Decline,
}

impl StatusAction {
    pub fn target_status(self) -> NotificationStatus {
        match self {
            StatusAction::MarkRead => NotificationStatus::Read,
            StatusAction::Approve => NotificationStatus::Approved,
            StatusAction::Reject => NotificationStatus::Rejected,
            StatusAction::Resolve => NotificationStatus::Resolved,
            StatusAction::Decline => NotificationStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainNotification {
    pub id: String,
    pub target: Target,
    pub kind: NotificationKind,
    pub message: String,
    pub status: NotificationStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Pushed to subscribers after a write commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationUpdate {
    Created(DomainNotification),
    StatusChanged {
        id: String,
        status: NotificationStatus,
        updated_at: String,
    },
}

impl NotificationUpdate {
    pub fn notification_id(&self) -> &str {
        match self {
            NotificationUpdate::Created(n) => &n.id,
            NotificationUpdate::StatusChanged { id, .. } => id,
        }
    }
}
