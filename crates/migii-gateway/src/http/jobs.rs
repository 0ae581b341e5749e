//! Job postings under `/api/jobs`: post, review, assign.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use migii_store::{JobPosting, JobStatus, NewJobPosting, Worker};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::http::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub worker_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub job: JobPosting,
    /// Job alerts created by this call. Zero when the job was already approved.
    pub alerts_sent: usize,
}

#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub job: JobPosting,
    pub worker: Worker,
}

/// POST /api/jobs: create a pending posting and ask admins to review it.
pub async fn create(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewJobPosting>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobPosting>)> {
    let Json(new) = body?;
    new.validate()?;
    let (job, _) = state.reviews.post_job(&new)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs?status=
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobQuery>,
) -> ApiResult<Json<Vec<JobPosting>>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(s.parse::<JobStatus>().map_err(ApiError::validation)?),
    };
    Ok(Json(state.store.list_jobs(status)?))
}

/// POST /api/jobs/{id}/approve: approve and alert matching available workers.
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApprovalResponse>> {
    let decision = state.reviews.decide(&id, JobStatus::Approved)?;
    Ok(Json(ApprovalResponse {
        job: decision.job,
        alerts_sent: decision.alerts_sent,
    }))
}

/// POST /api/jobs/{id}/reject: also settles the admin review.
pub async fn reject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobPosting>> {
    Ok(Json(state.reviews.decide(&id, JobStatus::Rejected)?.job))
}

/// POST /api/jobs/{id}/assign
pub async fn assign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<AssignBody>, JsonRejection>,
) -> ApiResult<Json<AssignmentResponse>> {
    let Json(AssignBody { worker_id }) = body?;
    if worker_id.trim().is_empty() {
        return Err(ApiError::validation("worker_id is required"));
    }
    let (job, worker) = state.store.assign_worker(&id, worker_id.trim())?;
    state.notifications.notify_assignment(&job, &worker)?;
    Ok(Json(AssignmentResponse { job, worker }))
}
