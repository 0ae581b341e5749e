//! Job review workflow: a posting and its admin `job_review` notification
//! move together, whichever side the decision arrives from.

use std::sync::Arc;

use migii_store::{JobPosting, JobStatus, NewJobPosting, Store};
use tracing::{info, instrument, warn};

use crate::board::StatusWriter;
use crate::error::{NotificationError, Result};
use crate::gateway::NotificationGateway;
use crate::types::{DomainNotification, NotificationKind, NotificationStatus, StatusAction};

/// Outcome of approving or rejecting a posting.
#[derive(Debug, Clone)]
pub struct JobDecision {
    pub job: JobPosting,
    /// Job alerts created by this call.
    pub alerts_sent: usize,
    /// The posting's review notification after the decision, if it has one.
    pub review: Option<DomainNotification>,
}

/// Applies review decisions across the store and the notification gateway.
///
/// The review notification is settled last. While it is still `pending` a
/// decision counts as unfinished, so repeating it redoes the fan-out
/// (already-alerted workers are skipped) and then settles the review.
pub struct ReviewDesk {
    store: Arc<Store>,
    notifications: Arc<NotificationGateway>,
}

impl ReviewDesk {
    pub fn new(store: Arc<Store>, notifications: Arc<NotificationGateway>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Create a pending posting and ask the admins to review it. If the
    /// review cannot be written the posting is removed again.
    pub fn post_job(&self, new: &NewJobPosting) -> Result<(JobPosting, DomainNotification)> {
        let job = self.store.create_job(new)?;
        match self.notifications.notify_job_review(&job) {
            Ok(review) => Ok((job, review)),
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "job review not recorded, withdrawing posting");
                if let Err(undo) = self.store.delete_job(&job.id) {
                    warn!(job_id = %job.id, error = %undo, "failed to withdraw unreviewed posting");
                }
                Err(e)
            }
        }
    }

    /// Approve or reject `job_id`. Approval alerts every available worker
    /// whose skill matches the category.
    #[instrument(skip(self))]
    pub fn decide(&self, job_id: &str, status: JobStatus) -> Result<JobDecision> {
        let action = match status {
            JobStatus::Approved => StatusAction::Approve,
            JobStatus::Rejected => StatusAction::Reject,
            JobStatus::Pending => {
                return Err(NotificationError::Invalid(
                    "a posting cannot be returned to pending".into(),
                ))
            }
        };

        let review = self.notifications.find_job_review(job_id)?;
        let (job, changed) = self.store.set_job_status(job_id, status)?;
        let settled = review
            .as_ref()
            .is_some_and(|r| r.status != NotificationStatus::Pending);

        let mut alerts_sent = 0;
        if job.status == JobStatus::Approved && (changed || !settled) {
            let candidates = self.store.available_workers_with_skill(&job.category)?;
            alerts_sent = self
                .notifications
                .fan_out_job_alerts(&job, &candidates)?
                .len();
        }

        let review = match review {
            Some(r) => Some(self.notifications.apply(&r.id, action)?),
            None => None,
        };
        if changed || !settled {
            info!(status = %job.status, alerts_sent, "job review decided");
        }
        Ok(JobDecision {
            job,
            alerts_sent,
            review,
        })
    }

    /// Apply `action` to a notification. Approving or rejecting a
    /// `job_review` decides the posting it refers to.
    pub fn apply(&self, id: &str, action: StatusAction) -> Result<DomainNotification> {
        let current = self.notifications.get(id)?;
        let NotificationKind::JobReview { job_id, .. } = &current.kind else {
            return self.notifications.apply(id, action);
        };
        let status = match action {
            StatusAction::Approve => JobStatus::Approved,
            StatusAction::Reject => JobStatus::Rejected,
            _ => return self.notifications.apply(id, action),
        };

        // refuse a reversal before touching the posting
        current.kind.lifecycle().check(current.status, action.target_status())?;
        match self.decide(job_id, status)?.review {
            Some(review) if review.id == current.id => Ok(review),
            _ => self.notifications.apply(id, action),
        }
    }
}

impl StatusWriter for ReviewDesk {
    fn write_status(&self, id: &str, action: StatusAction) -> Result<DomainNotification> {
        self.apply(id, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;
    use migii_store::{ChangeJournal, NewWorker, StoreError};
    use rusqlite::Connection;

    struct Fixture {
        store: Arc<Store>,
        notifications: Arc<NotificationGateway>,
        desk: ReviewDesk,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::new(Connection::open_in_memory().unwrap(), ChangeJournal::new()).unwrap());
        let notifications = Arc::new(NotificationGateway::new(Connection::open_in_memory().unwrap()).unwrap());
        let desk = ReviewDesk::new(store.clone(), notifications.clone());
        Fixture {
            store,
            notifications,
            desk,
        }
    }

    fn posting(category: &str) -> NewJobPosting {
        NewJobPosting {
            business_id: "biz-1".into(),
            title: "Kitchen helper".into(),
            category: category.into(),
            description: None,
        }
    }

    fn register(store: &Store, phone: &str, skill: &str) -> String {
        store
            .register_worker(&NewWorker {
                name: "Maria Santos".into(),
                phone: phone.into(),
                email: None,
                nationality: Some("PH".into()),
                skill: skill.into(),
                location: None,
                documents: vec![],
            })
            .unwrap()
            .id
    }

    /// Make the notification table refuse inserts of one kind.
    fn refuse_inserts(n: &NotificationGateway, kind: &str) {
        n.db()
            .unwrap()
            .execute_batch(&format!(
                "CREATE TRIGGER refuse_{kind} BEFORE INSERT ON notifications
                 WHEN NEW.kind = '{kind}'
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;"
            ))
            .unwrap();
    }

    fn allow_inserts(n: &NotificationGateway, kind: &str) {
        n.db()
            .unwrap()
            .execute_batch(&format!("DROP TRIGGER refuse_{kind};"))
            .unwrap();
    }

    #[test]
    fn approving_the_job_settles_its_review() {
        let f = fixture();
        let w = register(&f.store, "0111111111", "cooking");
        let (job, review) = f.desk.post_job(&posting("cooking")).unwrap();
        assert_eq!(review.status, NotificationStatus::Pending);

        let decision = f.desk.decide(&job.id, JobStatus::Approved).unwrap();
        assert_eq!(decision.job.status, JobStatus::Approved);
        assert_eq!(decision.alerts_sent, 1);
        assert_eq!(decision.review.unwrap().status, NotificationStatus::Approved);
        assert_eq!(f.notifications.unread_count(&Target::worker(&w)).unwrap(), 1);

        // settled: repeating is a no-op, reversing is refused
        assert_eq!(f.desk.decide(&job.id, JobStatus::Approved).unwrap().alerts_sent, 0);
        assert!(matches!(
            f.desk.decide(&job.id, JobStatus::Rejected),
            Err(NotificationError::Store(StoreError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn approving_the_review_decides_the_job() {
        let f = fixture();
        let w = register(&f.store, "0111111111", "cooking");
        let (job, review) = f.desk.post_job(&posting("cooking")).unwrap();

        let approved = f.desk.apply(&review.id, StatusAction::Approve).unwrap();
        assert_eq!(approved.status, NotificationStatus::Approved);
        assert_eq!(f.store.get_job(&job.id).unwrap().status, JobStatus::Approved);
        assert_eq!(f.notifications.unread_count(&Target::worker(&w)).unwrap(), 1);

        assert!(matches!(
            f.desk.apply(&review.id, StatusAction::Reject),
            Err(NotificationError::InvalidTransition { .. })
        ));
        assert_eq!(f.store.get_job(&job.id).unwrap().status, JobStatus::Approved);
    }

    #[test]
    fn rejecting_either_side_rejects_both() {
        let f = fixture();
        let (first, first_review) = f.desk.post_job(&posting("cooking")).unwrap();
        let (second, second_review) = f.desk.post_job(&posting("cooking")).unwrap();

        f.desk.decide(&first.id, JobStatus::Rejected).unwrap();
        assert_eq!(
            f.notifications.get(&first_review.id).unwrap().status,
            NotificationStatus::Rejected
        );

        f.desk.apply(&second_review.id, StatusAction::Reject).unwrap();
        assert_eq!(f.store.get_job(&second.id).unwrap().status, JobStatus::Rejected);
    }

    #[test]
    fn other_notifications_pass_through() {
        let f = fixture();
        let ticket = f
            .notifications
            .submit_support_request(Target::worker("w9"), "Visa", "Permit renewal")
            .unwrap();
        let resolved = f.desk.apply(&ticket.id, StatusAction::Resolve).unwrap();
        assert_eq!(resolved.status, NotificationStatus::Resolved);
    }

    #[test]
    fn failed_fan_out_is_completed_by_retrying() {
        let f = fixture();
        let w = register(&f.store, "0111111111", "cooking");
        let (job, review) = f.desk.post_job(&posting("cooking")).unwrap();

        refuse_inserts(&f.notifications, "job_alert");
        assert!(matches!(
            f.desk.decide(&job.id, JobStatus::Approved),
            Err(NotificationError::Database(_))
        ));
        // the posting committed but the review still marks the decision unfinished
        assert_eq!(f.store.get_job(&job.id).unwrap().status, JobStatus::Approved);
        assert_eq!(
            f.notifications.get(&review.id).unwrap().status,
            NotificationStatus::Pending
        );
        assert_eq!(f.notifications.unread_count(&Target::worker(&w)).unwrap(), 0);

        allow_inserts(&f.notifications, "job_alert");
        let retry = f.desk.decide(&job.id, JobStatus::Approved).unwrap();
        assert_eq!(retry.alerts_sent, 1);
        assert_eq!(retry.review.unwrap().status, NotificationStatus::Approved);
        assert_eq!(f.notifications.unread_count(&Target::worker(&w)).unwrap(), 1);
    }

    #[test]
    fn posting_is_withdrawn_when_review_cannot_be_written() {
        let f = fixture();
        refuse_inserts(&f.notifications, "job_review");

        assert!(f.desk.post_job(&posting("cooking")).is_err());
        assert!(f.store.list_jobs(None).unwrap().is_empty());
    }
}
