//! Domain notifications for workers, businesses and admins.
//!
//! [`NotificationGateway`] persists notifications and publishes a
//! [`NotificationUpdate`] after every committed write. [`NotificationBoard`]
//! is a recipient's local view that only adopts confirmed status changes.
//! [`ReviewDesk`] keeps job postings and their admin reviews in step.

pub mod board;
pub mod db;
pub mod error;
pub mod gateway;
pub mod review;
pub mod types;

pub use board::{NotificationBoard, StatusWriter};
pub use error::{NotificationError, Result};
pub use gateway::NotificationGateway;
pub use review::{JobDecision, ReviewDesk};
pub use types::{
    DomainNotification, Lifecycle, NotificationKind, NotificationStatus, NotificationUpdate,
    StatusAction, Target, TargetKind,
};
