use migii_core::config::UploadConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Availability of a worker for new assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Available,
    Assigned,
    Inactive,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Assigned => write!(f, "assigned"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "assigned" => Ok(Self::Assigned),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown worker status: {other}")),
        }
    }
}

/// Metadata for a document attached at registration (passport, permit, photo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerDocument {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Body of `POST /api/workers/register` and `PUT /api/workers/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorker {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nationality: Option<String>,
    pub skill: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub documents: Vec<WorkerDocument>,
}

impl NewWorker {
    /// Check required fields and document limits before anything is written.
    pub fn validate(&self, uploads: &UploadConfig) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("name is required".into()));
        }
        if self.skill.trim().is_empty() {
            return Err(StoreError::Invalid("skill is required".into()));
        }
        let digits = self.phone.chars().filter(|c| c.is_ascii_digit()).count();
        if digits < 7 {
            return Err(StoreError::Invalid(format!(
                "phone number looks invalid: {}",
                self.phone
            )));
        }
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(StoreError::Invalid(format!("invalid email: {email}")));
            }
        }
        for doc in &self.documents {
            if !uploads.allows_mime(&doc.mime_type) {
                return Err(StoreError::Invalid(format!(
                    "document {} has unsupported type {}",
                    doc.name, doc.mime_type
                )));
            }
            if doc.size_bytes > uploads.max_bytes {
                return Err(StoreError::Invalid(format!(
                    "document {} is {} bytes (max {})",
                    doc.name, doc.size_bytes, uploads.max_bytes
                )));
            }
        }
        Ok(())
    }
}

/// A registered worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub nationality: Option<String>,
    pub skill: String,
    pub location: Option<String>,
    pub status: WorkerStatus,
    pub documents: Vec<WorkerDocument>,
    pub created_at: String,
    pub updated_at: String,
}

/// Optional filters for `GET /api/workers`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerFilter {
    pub status: Option<WorkerStatus>,
    pub skill: Option<String>,
}

/// Review state of a job posting. Only `pending` may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Approved,
    Rejected,
}

impl JobStatus {
    /// Validate `self → next`. Returns `Ok(false)` when already at `next`.
    pub fn check_transition(self, next: JobStatus) -> Result<bool> {
        match (self, next) {
            (a, b) if a == b => Ok(false),
            (JobStatus::Pending, JobStatus::Approved | JobStatus::Rejected) => Ok(true),
            (from, to) => Err(StoreError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Body of `POST /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJobPosting {
    pub business_id: String,
    pub title: String,
    /// Matched case-insensitively against worker skills on approval.
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewJobPosting {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("business_id", &self.business_id),
            ("title", &self.title),
            ("category", &self.category),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::Invalid(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    pub business_id: String,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    pub status: JobStatus,
    pub assigned_worker_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> NewWorker {
        NewWorker {
            name: "Nguyen Van A".into(),
            phone: "+84 912 345 678".into(),
            email: None,
            nationality: Some("VN".into()),
            skill: "welding".into(),
            location: None,
            documents: vec![],
        }
    }

    #[test]
    fn valid_worker_passes() {
        assert!(worker().validate(&UploadConfig::default()).is_ok());
    }

    #[test]
    fn blank_skill_is_rejected() {
        let mut w = worker();
        w.skill = "  ".into();
        assert!(matches!(
            w.validate(&UploadConfig::default()),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn document_mime_and_size_are_checked() {
        let uploads = UploadConfig::default();
        let mut w = worker();
        w.documents.push(WorkerDocument {
            name: "permit.exe".into(),
            mime_type: "application/x-msdownload".into(),
            size_bytes: 10,
        });
        assert!(w.validate(&uploads).is_err());

        w.documents[0].mime_type = "application/pdf".into();
        w.documents[0].size_bytes = uploads.max_bytes + 1;
        assert!(w.validate(&uploads).is_err());

        w.documents[0].size_bytes = 1024;
        assert!(w.validate(&uploads).is_ok());
    }

    #[test]
    fn job_status_is_monotonic() {
        assert!(JobStatus::Pending.check_transition(JobStatus::Approved).unwrap());
        assert!(!JobStatus::Approved.check_transition(JobStatus::Approved).unwrap());
        assert!(JobStatus::Approved.check_transition(JobStatus::Rejected).is_err());
        assert!(JobStatus::Rejected.check_transition(JobStatus::Pending).is_err());
    }
}
