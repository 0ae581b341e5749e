use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use migii_notifications::{DomainNotification, Target};
use serde::Deserialize;

use crate::app::AppState;
use crate::http::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct SupportBody {
    pub requester: Target,
    pub subject: String,
    pub body: String,
}

/// POST /api/support: file a support request with the admins.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SupportBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DomainNotification>)> {
    let Json(req) = body?;
    let created = state
        .notifications
        .submit_support_request(req.requester, &req.subject, &req.body)?;
    Ok((StatusCode::CREATED, Json(created)))
}
