use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use migii_store::{JobPosting, Worker, WorkerStatus};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{NotificationError, Result};
use crate::types::*;

const UPDATE_CAPACITY: usize = 256;

const COLUMNS: &str =
    "id, target_kind, target_id, payload, message, status, created_at, updated_at";

/// Persisted domain notifications plus a live update channel.
///
/// Writes commit first; [`NotificationUpdate`]s are published only after the
/// commit, so subscribers never see a change that was rolled back.
pub struct NotificationGateway {
    db: Mutex<Connection>,
    updates: broadcast::Sender<NotificationUpdate>,
}

impl NotificationGateway {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Ok(Self {
            db: Mutex::new(conn),
            updates,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationUpdate> {
        self.updates.subscribe()
    }

    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| NotificationError::Poisoned)
    }

    fn publish(&self, update: NotificationUpdate) {
        // no subscribers is fine
        let _ = self.updates.send(update);
    }

    /// Insert all notifications in one transaction, then announce them.
    fn create_all(&self, drafts: Vec<(Target, NotificationKind, String)>) -> Result<Vec<DomainNotification>> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let created = build(drafts);
        {
            let mut db = self.db()?;
            let tx = db.transaction()?;
            insert_all(&tx, &created)?;
            tx.commit()?;
        }
        self.announce(&created);
        Ok(created)
    }

    fn announce(&self, created: &[DomainNotification]) {
        for n in created {
            debug!(notification_id = %n.id, target = %n.target, kind = n.kind.type_name(), "notification created");
            self.publish(NotificationUpdate::Created(n.clone()));
        }
    }

    fn create_one(&self, target: Target, kind: NotificationKind, message: String) -> Result<DomainNotification> {
        self.create_all(vec![(target, kind, message)])?
            .pop()
            .ok_or_else(|| NotificationError::Invalid("nothing was created".into()))
    }

    // ── creation ─────────────────────────────────────────────────────────────

    /// Ask the admins to review a freshly posted job.
    pub fn notify_job_review(&self, job: &JobPosting) -> Result<DomainNotification> {
        self.create_one(
            Target::admin(),
            NotificationKind::JobReview {
                job_id: job.id.clone(),
                business_id: job.business_id.clone(),
                title: job.title.clone(),
            },
            format!("New job posting \"{}\" awaits review", job.title),
        )
    }

    /// One `job_alert` per eligible worker, written in a single transaction.
    ///
    /// Eligible: status `available` and a skill equal to the job category,
    /// ignoring case. Ineligible workers in `workers` are skipped, as are
    /// workers already alerted about this job, so repeating the fan-out
    /// only reaches the ones that were missed.
    #[instrument(skip(self, job, workers), fields(job_id = %job.id))]
    pub fn fan_out_job_alerts(&self, job: &JobPosting, workers: &[Worker]) -> Result<Vec<DomainNotification>> {
        let created = {
            let mut db = self.db()?;
            let tx = db.transaction()?;
            let alerted = alerted_workers(&tx, &job.id)?;
            let drafts: Vec<_> = workers
                .iter()
                .filter(|w| is_eligible(w, &job.category) && !alerted.contains(&w.id))
                .map(|w| {
                    (
                        Target::worker(&w.id),
                        NotificationKind::JobAlert {
                            job_id: job.id.clone(),
                            title: job.title.clone(),
                            category: job.category.clone(),
                        },
                        format!("New {} job available: {}", job.category, job.title),
                    )
                })
                .collect();
            let created = build(drafts);
            insert_all(&tx, &created)?;
            tx.commit()?;
            created
        };
        self.announce(&created);
        info!(alerts = created.len(), candidates = workers.len(), "job alerts fanned out");
        Ok(created)
    }

    /// Tell the worker about the assignment and the business about its worker.
    pub fn notify_assignment(&self, job: &JobPosting, worker: &Worker) -> Result<Vec<DomainNotification>> {
        self.create_all(vec![
            (
                Target::worker(&worker.id),
                NotificationKind::WorkerAssigned {
                    job_id: job.id.clone(),
                    business_id: job.business_id.clone(),
                    title: job.title.clone(),
                },
                format!("You have been assigned to \"{}\"", job.title),
            ),
            (
                Target::business(&job.business_id),
                NotificationKind::AssignmentUpdate {
                    job_id: job.id.clone(),
                    worker_id: worker.id.clone(),
                },
                format!("{} was assigned to \"{}\"", worker.name, job.title),
            ),
        ])
    }

    pub fn submit_support_request(
        &self,
        requester: Target,
        subject: &str,
        body: &str,
    ) -> Result<DomainNotification> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(NotificationError::Invalid("subject is required".into()));
        }
        if body.trim().is_empty() {
            return Err(NotificationError::Invalid("body is required".into()));
        }
        let message = format!("Support request from {requester}: {subject}");
        self.create_one(
            Target::admin(),
            NotificationKind::SupportRequest {
                requester,
                subject: subject.to_string(),
                body: body.trim().to_string(),
            },
            message,
        )
    }

    // ── reads ────────────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Result<DomainNotification> {
        let db = self.db()?;
        fetch(&db, id)
    }

    /// The admin review raised when `job_id` was posted, if there is one.
    pub fn find_job_review(&self, job_id: &str) -> Result<Option<DomainNotification>> {
        let db = self.db()?;
        db.query_row(
            &format!(
                "SELECT {COLUMNS} FROM notifications
                 WHERE kind = 'job_review' AND json_extract(payload, '$.job_id') = ?1
                 ORDER BY created_at, rowid LIMIT 1"
            ),
            [job_id],
            row_to_raw,
        )
        .optional()?
        .map(RawRow::into_notification)
        .transpose()
    }

    /// Notifications for `target`, newest first.
    pub fn list_for(&self, target: &Target) -> Result<Vec<DomainNotification>> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {COLUMNS} FROM notifications
             WHERE target_kind = ?1 AND target_id = ?2
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![target.kind.to_string(), target.id], row_to_raw)?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_notification()?);
        }
        Ok(out)
    }

    pub fn unread_count(&self, target: &Target) -> Result<u64> {
        let count: i64 = self.db()?.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE target_kind = ?1 AND target_id = ?2 AND status = 'unread'",
            params![target.kind.to_string(), target.id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ── status actions ───────────────────────────────────────────────────────

    pub fn mark_as_read(&self, id: &str) -> Result<DomainNotification> {
        self.apply(id, StatusAction::MarkRead)
    }

    pub fn approve(&self, id: &str) -> Result<DomainNotification> {
        self.apply(id, StatusAction::Approve)
    }

    pub fn reject(&self, id: &str) -> Result<DomainNotification> {
        self.apply(id, StatusAction::Reject)
    }

    pub fn resolve(&self, id: &str) -> Result<DomainNotification> {
        self.apply(id, StatusAction::Resolve)
    }

    pub fn decline(&self, id: &str) -> Result<DomainNotification> {
        self.apply(id, StatusAction::Decline)
    }

    /// Validate `action` against the notification's lifecycle, write it, and
    /// only then publish `StatusChanged`. Repeating a confirmed action
    /// returns the stored notification without a new update.
    #[instrument(skip(self), fields(notification_id = %id))]
    pub fn apply(&self, id: &str, action: StatusAction) -> Result<DomainNotification> {
        let next = action.target_status();
        let updated = {
            let db = self.db()?;
            let current = fetch(&db, id)?;
            if !current.kind.lifecycle().check(current.status, next)? {
                debug!(status = %next, "status unchanged");
                return Ok(current);
            }
            db.execute(
                "UPDATE notifications SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![next.as_str(), now(), id],
            )?;
            fetch(&db, id)?
        };

        info!(status = %updated.status, "notification status changed");
        self.publish(NotificationUpdate::StatusChanged {
            id: updated.id.clone(),
            status: updated.status,
            updated_at: updated.updated_at.clone(),
        });
        Ok(updated)
    }

    /// Mark every unread notification of `target` as read. Returns how many
    /// changed.
    pub fn mark_all_as_read(&self, target: &Target) -> Result<usize> {
        let now = now();
        let ids = {
            let mut db = self.db()?;
            let tx = db.transaction()?;
            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM notifications
                     WHERE target_kind = ?1 AND target_id = ?2 AND status = 'unread'",
                )?;
                let rows = stmt.query_map(params![target.kind.to_string(), target.id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            tx.execute(
                "UPDATE notifications SET status = 'read', updated_at = ?1
                 WHERE target_kind = ?2 AND target_id = ?3 AND status = 'unread'",
                params![now, target.kind.to_string(), target.id],
            )?;
            tx.commit()?;
            ids
        };

        for id in &ids {
            self.publish(NotificationUpdate::StatusChanged {
                id: id.clone(),
                status: NotificationStatus::Read,
                updated_at: now.clone(),
            });
        }
        info!(target = %target, count = ids.len(), "notifications marked read");
        Ok(ids.len())
    }
}

fn build(drafts: Vec<(Target, NotificationKind, String)>) -> Vec<DomainNotification> {
    let now = now();
    drafts
        .into_iter()
        .map(|(target, kind, message)| DomainNotification {
            id: Uuid::now_v7().to_string(),
            target,
            status: kind.lifecycle().initial(),
            kind,
            message,
            created_at: now.clone(),
            updated_at: now.clone(),
        })
        .collect()
}

fn insert_all(conn: &Connection, created: &[DomainNotification]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO notifications
         (id, target_kind, target_id, kind, payload, message, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
    )?;
    for n in created {
        stmt.execute(params![
            n.id,
            n.target.kind.to_string(),
            n.target.id,
            n.kind.type_name(),
            serde_json::to_string(&n.kind)?,
            n.message,
            n.status.as_str(),
            n.created_at,
        ])?;
    }
    Ok(())
}

/// Workers that already hold a `job_alert` for `job_id`.
fn alerted_workers(conn: &Connection, job_id: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT target_id FROM notifications
         WHERE kind = 'job_alert' AND json_extract(payload, '$.job_id') = ?1",
    )?;
    let rows = stmt.query_map([job_id], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<HashSet<String>>>()?)
}

fn is_eligible(worker: &Worker, category: &str) -> bool {
    worker.status == WorkerStatus::Available && worker.skill.trim().eq_ignore_ascii_case(category.trim())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Row shape before the JSON payload and enums are decoded.
struct RawRow {
    id: String,
    target_kind: String,
    target_id: String,
    payload: String,
    message: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn into_notification(self) -> Result<DomainNotification> {
        let kind = self.target_kind.parse::<TargetKind>().map_err(NotificationError::Invalid)?;
        Ok(DomainNotification {
            id: self.id,
            target: Target {
                kind,
                id: self.target_id,
            },
            kind: serde_json::from_str(&self.payload)?,
            message: self.message,
            status: self.status.parse::<NotificationStatus>().map_err(NotificationError::Invalid)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        target_kind: row.get(1)?,
        target_id: row.get(2)?,
        payload: row.get(3)?,
        message: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn fetch(conn: &Connection, id: &str) -> Result<DomainNotification> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM notifications WHERE id = ?1"),
        [id],
        row_to_raw,
    )
    .optional()?
    .ok_or_else(|| NotificationError::NotFound(id.to_string()))?
    .into_notification()
}
