//! Worker registration and management under `/api/workers`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use migii_store::{NewWorker, Worker, WorkerFilter, WorkerStatus};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct WorkerQuery {
    pub status: Option<String>,
    pub skill: Option<String>,
}

impl WorkerQuery {
    fn into_filter(self) -> ApiResult<WorkerFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<WorkerStatus>().map_err(ApiError::validation)?),
        };
        Ok(WorkerFilter {
            status,
            skill: self.skill.filter(|s| !s.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: WorkerStatus,
}

/// POST /api/workers/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewWorker>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Worker>)> {
    let Json(new) = body?;
    new.validate(&state.config.uploads)?;
    let worker = state.store.register_worker(&new)?;
    Ok((StatusCode::CREATED, Json(worker)))
}

/// GET /api/workers?status=&skill=
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorkerQuery>,
) -> ApiResult<Json<Vec<Worker>>> {
    let filter = query.into_filter()?;
    Ok(Json(state.store.list_workers(&filter)?))
}

/// GET /api/workers/{id}
pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Worker>> {
    Ok(Json(state.store.get_worker(&id)?))
}

/// PUT /api/workers/{id}: full profile replacement.
pub async fn replace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<NewWorker>, JsonRejection>,
) -> ApiResult<Json<Worker>> {
    let Json(new) = body?;
    new.validate(&state.config.uploads)?;
    Ok(Json(state.store.replace_worker(&id, &new)?))
}

/// PATCH /api/workers/{id}/status
pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult<Json<Worker>> {
    let Json(StatusBody { status }) = body?;
    Ok(Json(state.store.set_worker_status(&id, status)?))
}

/// DELETE /api/workers/{id}
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_worker(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
