use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use migii_protocol::{ChangeEvent, OperationKind};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::journal::ChangeJournal;
use crate::types::*;

pub const WORKERS: &str = "workers";
pub const JOBS: &str = "jobs";

const WORKER_COLUMNS: &str = "id, name, phone, email, nationality, skill, location, status,
     documents, created_at, updated_at";
const JOB_COLUMNS: &str = "id, business_id, title, category, description, status,
     assigned_worker_id, created_at, updated_at";

/// Workers and job postings.
///
/// Thread-safe: wraps the SQLite connection in a Mutex. Every committed
/// write is published on the [`ChangeJournal`] after the lock is released.
pub struct Store {
    db: Mutex<Connection>,
    journal: ChangeJournal,
}

impl Store {
    pub fn new(conn: Connection, journal: ChangeJournal) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            journal,
        })
    }

    pub fn journal(&self) -> &ChangeJournal {
        &self.journal
    }

    fn db(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    fn publish<T: Serialize>(&self, collection: &str, operation: OperationKind, doc: &T) {
        match serde_json::to_value(doc) {
            Ok(v) => self.journal.publish(ChangeEvent::new(collection, operation, v)),
            Err(e) => warn!(collection, error = %e, "change not published: serialization failed"),
        }
    }

    // ── workers ──────────────────────────────────────────────────────────────

    /// Insert a new worker with status `available`.
    ///
    /// Callers validate with [`NewWorker::validate`] first; the store only
    /// enforces phone uniqueness.
    pub fn register_worker(&self, new: &NewWorker) -> Result<Worker> {
        let now = now();
        let worker = Worker {
            id: Uuid::now_v7().to_string(),
            name: new.name.trim().to_string(),
            phone: new.phone.trim().to_string(),
            email: new.email.clone(),
            nationality: new.nationality.clone(),
            skill: new.skill.trim().to_string(),
            location: new.location.clone(),
            status: WorkerStatus::Available,
            documents: new.documents.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        let documents = serde_json::to_string(&worker.documents)?;

        {
            let db = self.db()?;
            db.execute(
                &format!("INSERT INTO workers ({WORKER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)"),
                params![
                    worker.id,
                    worker.name,
                    worker.phone,
                    worker.email,
                    worker.nationality,
                    worker.skill,
                    worker.location,
                    worker.status.to_string(),
                    documents,
                    worker.created_at,
                ],
            )
            .map_err(|e| phone_conflict(e, &worker.phone))?;
        }

        info!(worker_id = %worker.id, skill = %worker.skill, "worker registered");
        self.publish(WORKERS, OperationKind::Insert, &worker);
        Ok(worker)
    }

    pub fn get_worker(&self, id: &str) -> Result<Worker> {
        let db = self.db()?;
        fetch_worker(&db, id)
    }

    /// All workers matching `filter`, newest first.
    pub fn list_workers(&self, filter: &WorkerFilter) -> Result<Vec<Worker>> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR skill = ?2 COLLATE NOCASE)
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let status = filter.status.map(|s| s.to_string());
        let rows = stmt.query_map(params![status, filter.skill], row_to_worker)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Full replacement of a worker's profile. Status and creation time are kept.
    pub fn replace_worker(&self, id: &str, new: &NewWorker) -> Result<Worker> {
        let documents = serde_json::to_string(&new.documents)?;
        let worker = {
            let db = self.db()?;
            let n = db
                .execute(
                    "UPDATE workers SET name = ?1, phone = ?2, email = ?3, nationality = ?4,
                     skill = ?5, location = ?6, documents = ?7, updated_at = ?8
                     WHERE id = ?9",
                    params![
                        new.name.trim(),
                        new.phone.trim(),
                        new.email,
                        new.nationality,
                        new.skill.trim(),
                        new.location,
                        documents,
                        now(),
                        id,
                    ],
                )
                .map_err(|e| phone_conflict(e, new.phone.trim()))?;
            if n == 0 {
                return Err(not_found("worker", id));
            }
            fetch_worker(&db, id)?
        };

        info!(worker_id = %id, "worker replaced");
        self.publish(WORKERS, OperationKind::Replace, &worker);
        Ok(worker)
    }

    pub fn set_worker_status(&self, id: &str, status: WorkerStatus) -> Result<Worker> {
        let worker = {
            let db = self.db()?;
            let n = db.execute(
                "UPDATE workers SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.to_string(), now(), id],
            )?;
            if n == 0 {
                return Err(not_found("worker", id));
            }
            fetch_worker(&db, id)?
        };

        info!(worker_id = %id, %status, "worker status changed");
        self.publish(WORKERS, OperationKind::Update, &worker);
        Ok(worker)
    }

    pub fn delete_worker(&self, id: &str) -> Result<()> {
        let n = self
            .db()?
            .execute("DELETE FROM workers WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(not_found("worker", id));
        }
        info!(worker_id = %id, "worker deleted");
        self.publish(WORKERS, OperationKind::Delete, &serde_json::json!({ "id": id }));
        Ok(())
    }

    /// Workers eligible for a job alert: status `available` and a skill
    /// equal to `category`, ignoring case.
    pub fn available_workers_with_skill(&self, category: &str) -> Result<Vec<Worker>> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers
             WHERE status = 'available' AND skill = ?1 COLLATE NOCASE
             ORDER BY created_at"
        ))?;
        let rows = stmt.query_map([category.trim()], row_to_worker)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ── jobs ─────────────────────────────────────────────────────────────────

    /// Create a job posting in `pending` state, awaiting admin review.
    pub fn create_job(&self, new: &NewJobPosting) -> Result<JobPosting> {
        let now = now();
        let job = JobPosting {
            id: Uuid::now_v7().to_string(),
            business_id: new.business_id.trim().to_string(),
            title: new.title.trim().to_string(),
            category: new.category.trim().to_string(),
            description: new.description.clone(),
            status: JobStatus::Pending,
            assigned_worker_id: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.db()?.execute(
            &format!("INSERT INTO jobs ({JOB_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)"),
            params![
                job.id,
                job.business_id,
                job.title,
                job.category,
                job.description,
                job.status.to_string(),
                job.created_at,
            ],
        )?;

        info!(job_id = %job.id, business_id = %job.business_id, "job posted");
        self.publish(JOBS, OperationKind::Insert, &job);
        Ok(job)
    }

    pub fn get_job(&self, id: &str) -> Result<JobPosting> {
        let db = self.db()?;
        fetch_job(&db, id)
    }

    /// Remove a posting. Used to undo a posting whose review could not be
    /// recorded.
    pub fn delete_job(&self, id: &str) -> Result<()> {
        let n = self.db()?.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n == 0 {
            return Err(not_found("job", id));
        }
        info!(job_id = %id, "job deleted");
        self.publish(JOBS, OperationKind::Delete, &serde_json::json!({ "id": id }));
        Ok(())
    }

    pub fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<JobPosting>> {
        let db = self.db()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map([status.map(|s| s.to_string())], row_to_job)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Move a posting out of `pending`. Returns the posting and whether the
    /// status actually changed; repeating the same decision is a no-op.
    pub fn set_job_status(&self, id: &str, next: JobStatus) -> Result<(JobPosting, bool)> {
        let (job, changed) = {
            let db = self.db()?;
            let current = fetch_job(&db, id)?;
            if !current.status.check_transition(next)? {
                return Ok((current, false));
            }
            db.execute(
                "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![next.to_string(), now(), id],
            )?;
            (fetch_job(&db, id)?, true)
        };

        info!(job_id = %id, status = %next, "job reviewed");
        self.publish(JOBS, OperationKind::Update, &job);
        Ok((job, changed))
    }

    /// Assign an available worker to an approved, unassigned posting.
    /// Both rows change in one transaction.
    pub fn assign_worker(&self, job_id: &str, worker_id: &str) -> Result<(JobPosting, Worker)> {
        let (job, worker) = {
            let mut db = self.db()?;
            let tx = db.transaction()?;

            let job = fetch_job(&tx, job_id)?;
            if job.status != JobStatus::Approved {
                return Err(StoreError::Conflict(format!(
                    "job {job_id} is {} and cannot take assignments",
                    job.status
                )));
            }
            if let Some(existing) = &job.assigned_worker_id {
                return Err(StoreError::Conflict(format!(
                    "job {job_id} is already assigned to {existing}"
                )));
            }
            let worker = fetch_worker(&tx, worker_id)?;
            if worker.status != WorkerStatus::Available {
                return Err(StoreError::Conflict(format!(
                    "worker {worker_id} is {}",
                    worker.status
                )));
            }

            let now = now();
            tx.execute(
                "UPDATE jobs SET assigned_worker_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![worker_id, now, job_id],
            )?;
            tx.execute(
                "UPDATE workers SET status = 'assigned', updated_at = ?1 WHERE id = ?2",
                params![now, worker_id],
            )?;
            let job = fetch_job(&tx, job_id)?;
            let worker = fetch_worker(&tx, worker_id)?;
            tx.commit()?;
            (job, worker)
        };

        info!(job_id, worker_id, "worker assigned");
        self.publish(JOBS, OperationKind::Update, &job);
        self.publish(WORKERS, OperationKind::Update, &worker);
        Ok((job, worker))
    }

    // ── change feed support ──────────────────────────────────────────────────

    /// The `limit` most recently updated records of `collection` as JSON,
    /// newest first.
    pub fn recent_updates(&self, collection: &str, limit: usize) -> Result<Vec<Value>> {
        let db = self.db()?;
        let docs = match collection {
            WORKERS => {
                let mut stmt = db.prepare_cached(&format!(
                    "SELECT {WORKER_COLUMNS} FROM workers
                     ORDER BY updated_at DESC, rowid DESC LIMIT ?1"
                ))?;
                let rows: Vec<Worker> = stmt
                    .query_map([limit], row_to_worker)?
                    .collect::<rusqlite::Result<_>>()?;
                rows.iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            JOBS => {
                let mut stmt = db.prepare_cached(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs
                     ORDER BY updated_at DESC, rowid DESC LIMIT ?1"
                ))?;
                let rows: Vec<JobPosting> = stmt
                    .query_map([limit], row_to_job)?
                    .collect::<rusqlite::Result<_>>()?;
                rows.iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            other => return Err(not_found("collection", other)),
        };
        debug!(collection, count = docs.len(), "recent updates fetched");
        Ok(docs)
    }
}

// --- private helpers ---------------------------------------------------------

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn not_found(kind: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Map a UNIQUE(phone) violation to a conflict; pass everything else through.
fn phone_conflict(e: rusqlite::Error, phone: &str) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(format!("phone {phone} is already registered"))
        }
        other => StoreError::Database(other),
    }
}

fn fetch_worker(conn: &Connection, id: &str) -> Result<Worker> {
    conn.query_row(
        &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE id = ?1"),
        [id],
        row_to_worker,
    )
    .optional()?
    .ok_or_else(|| not_found("worker", id))
}

fn fetch_job(conn: &Connection, id: &str) -> Result<JobPosting> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
        [id],
        row_to_job,
    )
    .optional()?
    .ok_or_else(|| not_found("job", id))
}

/// A stored value that no longer decodes into its domain type.
fn bad_column(idx: usize, err: Box<dyn std::error::Error + Send + Sync>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err)
}

fn row_to_worker(row: &rusqlite::Row<'_>) -> rusqlite::Result<Worker> {
    let status: String = row.get(7)?;
    let documents: String = row.get(8)?;
    Ok(Worker {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        email: row.get(3)?,
        nationality: row.get(4)?,
        skill: row.get(5)?,
        location: row.get(6)?,
        status: status.parse::<WorkerStatus>().map_err(|e: String| bad_column(7, e.into()))?,
        documents: serde_json::from_str(&documents).map_err(|e| bad_column(8, Box::new(e)))?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobPosting> {
    let status: String = row.get(5)?;
    Ok(JobPosting {
        id: row.get(0)?,
        business_id: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        status: status.parse::<JobStatus>().map_err(|e: String| bad_column(5, e.into()))?,
        assigned_worker_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn store() -> Store {
        Store::new(Connection::open_in_memory().unwrap(), ChangeJournal::new()).unwrap()
    }

    fn new_worker(phone: &str, skill: &str) -> NewWorker {
        NewWorker {
            name: "Siti Aminah".into(),
            phone: phone.into(),
            email: Some("siti@example.com".into()),
            nationality: Some("ID".into()),
            skill: skill.into(),
            location: Some("Kuala Lumpur".into()),
            documents: vec![WorkerDocument {
                name: "passport.pdf".into(),
                mime_type: "application/pdf".into(),
                size_bytes: 120_000,
            }],
        }
    }

    fn new_job(category: &str) -> NewJobPosting {
        NewJobPosting {
            business_id: "biz-1".into(),
            title: "Night shift welder".into(),
            category: category.into(),
            description: None,
        }
    }

    #[test]
    fn register_and_fetch_worker() {
        let s = store();
        let w = s.register_worker(&new_worker("0123456789", "welding")).unwrap();
        assert_eq!(w.status, WorkerStatus::Available);

        let fetched = s.get_worker(&w.id).unwrap();
        assert_eq!(fetched, w);
        assert_eq!(fetched.documents.len(), 1);
    }

    #[test]
    fn duplicate_phone_is_a_conflict() {
        let s = store();
        s.register_worker(&new_worker("0123456789", "welding")).unwrap();
        let err = s
            .register_worker(&new_worker("0123456789", "cooking"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn list_filters_by_status_and_skill() {
        let s = store();
        let a = s.register_worker(&new_worker("0100000001", "Welding")).unwrap();
        s.register_worker(&new_worker("0100000002", "cooking")).unwrap();
        s.set_worker_status(&a.id, WorkerStatus::Inactive).unwrap();

        let welders = s
            .list_workers(&WorkerFilter {
                status: None,
                skill: Some("welding".into()),
            })
            .unwrap();
        assert_eq!(welders.len(), 1);

        let available = s
            .list_workers(&WorkerFilter {
                status: Some(WorkerStatus::Available),
                skill: None,
            })
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].skill, "cooking");
    }

    #[test]
    fn eligible_workers_need_matching_skill_and_availability() {
        let s = store();
        let a = s.register_worker(&new_worker("0100000001", "welding")).unwrap();
        let b = s.register_worker(&new_worker("0100000002", "WELDING")).unwrap();
        s.register_worker(&new_worker("0100000003", "cooking")).unwrap();
        s.set_worker_status(&b.id, WorkerStatus::Assigned).unwrap();

        let eligible = s.available_workers_with_skill("Welding").unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, a.id);
    }

    #[test]
    fn delete_missing_worker_is_not_found() {
        let s = store();
        assert!(matches!(
            s.delete_worker("nope"),
            Err(StoreError::NotFound { kind: "worker", .. })
        ));
    }

    #[test]
    fn job_review_is_monotonic() {
        let s = store();
        let job = s.create_job(&new_job("welding")).unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let (approved, changed) = s.set_job_status(&job.id, JobStatus::Approved).unwrap();
        assert!(changed);
        assert_eq!(approved.status, JobStatus::Approved);

        let (_, changed) = s.set_job_status(&job.id, JobStatus::Approved).unwrap();
        assert!(!changed);

        assert!(matches!(
            s.set_job_status(&job.id, JobStatus::Rejected),
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn assignment_requires_approved_job_and_available_worker() {
        let s = store();
        let w = s.register_worker(&new_worker("0100000001", "welding")).unwrap();
        let job = s.create_job(&new_job("welding")).unwrap();

        assert!(matches!(
            s.assign_worker(&job.id, &w.id),
            Err(StoreError::Conflict(_))
        ));

        s.set_job_status(&job.id, JobStatus::Approved).unwrap();
        let (job, worker) = s.assign_worker(&job.id, &w.id).unwrap();
        assert_eq!(job.assigned_worker_id.as_deref(), Some(w.id.as_str()));
        assert_eq!(worker.status, WorkerStatus::Assigned);

        // second assignment on the same job is refused and changes nothing
        let other = s.register_worker(&new_worker("0100000002", "welding")).unwrap();
        assert!(s.assign_worker(&job.id, &other.id).is_err());
        assert_eq!(s.get_worker(&other.id).unwrap().status, WorkerStatus::Available);
    }

    #[test]
    fn undecodable_rows_are_errors_not_gaps() {
        let s = store();
        let a = s.register_worker(&new_worker("0100000001", "welding")).unwrap();
        s.register_worker(&new_worker("0100000002", "welding")).unwrap();
        s.db()
            .unwrap()
            .execute("UPDATE workers SET status = 'on_leave' WHERE id = ?1", [&a.id])
            .unwrap();

        assert!(matches!(s.get_worker(&a.id), Err(StoreError::Database(_))));
        assert!(matches!(
            s.list_workers(&WorkerFilter::default()),
            Err(StoreError::Database(_))
        ));
        assert!(s.available_workers_with_skill("welding").is_ok());
        assert!(s.recent_updates(WORKERS, 10).is_err());

        let job = s.create_job(&new_job("welding")).unwrap();
        s.db()
            .unwrap()
            .execute("UPDATE jobs SET status = 'archived' WHERE id = ?1", [&job.id])
            .unwrap();
        assert!(s.get_job(&job.id).is_err());
        assert!(s.list_jobs(None).is_err());
    }

    #[test]
    fn delete_job_removes_posting() {
        let s = store();
        let job = s.create_job(&new_job("welding")).unwrap();
        assert_eq!(s.get_job(&job.id).unwrap().id, job.id);

        s.delete_job(&job.id).unwrap();
        assert!(matches!(
            s.get_job(&job.id),
            Err(StoreError::NotFound { kind: "job", .. })
        ));
        assert!(s.list_jobs(None).unwrap().is_empty());
        assert!(s.delete_job(&job.id).is_err());
    }

    #[test]
    fn recent_updates_are_newest_first_and_capped() {
        let s = store();
        let mut ids = Vec::new();
        for i in 0..12 {
            let w = s
                .register_worker(&new_worker(&format!("01000000{i:02}"), "welding"))
                .unwrap();
            ids.push(w.id);
        }
        s.set_worker_status(&ids[0], WorkerStatus::Inactive).unwrap();

        let recent = s.recent_updates(WORKERS, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0]["id"], ids[0].as_str());
        assert_eq!(recent[0]["status"], "inactive");

        assert!(s.recent_updates("payments", 10).is_err());
    }

    #[tokio::test]
    async fn writes_are_published_on_the_journal() {
        let s = store();
        let mut workers = s.journal().subscribe(WORKERS);

        let w = s.register_worker(&new_worker("0100000001", "welding")).unwrap();
        let replaced = s
            .replace_worker(&w.id, &new_worker("0100000001", "masonry"))
            .unwrap();
        s.set_worker_status(&w.id, WorkerStatus::Inactive).unwrap();
        s.delete_worker(&w.id).unwrap();

        let ops: Vec<OperationKind> = (&mut workers)
            .take(4)
            .map(|ev| ev.operation)
            .collect()
            .await;
        assert_eq!(
            ops,
            vec![
                OperationKind::Insert,
                OperationKind::Replace,
                OperationKind::Update,
                OperationKind::Delete
            ]
        );
        assert_eq!(replaced.skill, "masonry");
        assert_eq!(replaced.created_at, w.created_at);
    }
}
