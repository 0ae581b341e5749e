//! Notification inbox endpoints under `/api/notifications`.
//!
//! `GET ?target_kind=&target_id=` lists a recipient's notifications, newest
//! first, with the unread count. Status actions return the stored
//! notification after the write commits.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use migii_notifications::{DomainNotification, StatusAction, Target, TargetKind};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::http::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct TargetQuery {
    pub target_kind: TargetKind,
    pub target_id: String,
}

impl TargetQuery {
    fn into_target(self) -> ApiResult<Target> {
        if self.target_id.trim().is_empty() {
            return Err(ApiError::validation("target_id is required"));
        }
        Ok(Target {
            kind: self.target_kind,
            id: self.target_id,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
    pub notifications: Vec<DomainNotification>,
    pub unread: u64,
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub updated: usize,
}

/// GET /api/notifications?target_kind=&target_id=
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TargetQuery>,
) -> ApiResult<Json<InboxResponse>> {
    let target = query.into_target()?;
    let notifications = state.notifications.list_for(&target)?;
    let unread = state.notifications.unread_count(&target)?;
    Ok(Json(InboxResponse {
        notifications,
        unread,
    }))
}

/// POST /api/notifications/read-all
pub async fn read_all(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TargetQuery>, JsonRejection>,
) -> ApiResult<Json<ReadAllResponse>> {
    let Json(query) = body?;
    let target = query.into_target()?;
    let updated = state.notifications.mark_all_as_read(&target)?;
    Ok(Json(ReadAllResponse { updated }))
}

/// Approving or rejecting a `job_review` also decides the posting.
fn act(state: &AppState, id: &str, action: StatusAction) -> ApiResult<Json<DomainNotification>> {
    Ok(Json(state.reviews.apply(id, action)?))
}

/// POST /api/notifications/{id}/read
pub async fn read(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DomainNotification>> {
    act(&state, &id, StatusAction::MarkRead)
}

/// POST /api/notifications/{id}/approve
pub async fn approve(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DomainNotification>> {
    act(&state, &id, StatusAction::Approve)
}

/// POST /api/notifications/{id}/reject
pub async fn reject(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DomainNotification>> {
    act(&state, &id, StatusAction::Reject)
}

/// POST /api/notifications/{id}/resolve
pub async fn resolve(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DomainNotification>> {
    act(&state, &id, StatusAction::Resolve)
}

/// POST /api/notifications/{id}/decline
pub async fn decline(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Json<DomainNotification>> {
    act(&state, &id, StatusAction::Decline)
}
