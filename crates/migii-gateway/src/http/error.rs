use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use migii_core::MigiiError;
use migii_notifications::NotificationError;
use migii_protocol::ErrorBody;
use migii_store::StoreError;
use tracing::{debug, error};

/// Error returned by every `/api/*` handler. Renders as `{ "message": ... }`.
#[derive(Debug)]
pub struct ApiError(pub MigiiError);

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self(MigiiError::Validation(msg.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            MigiiError::Validation(_) => StatusCode::BAD_REQUEST,
            MigiiError::NotFound { .. } => StatusCode::NOT_FOUND,
            MigiiError::Conflict(_) => StatusCode::CONFLICT,
            MigiiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            MigiiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            MigiiError::Config(_)
            | MigiiError::Database(_)
            | MigiiError::Protocol(_)
            | MigiiError::Serialization(_)
            | MigiiError::Io(_)
            | MigiiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MigiiError> for ApiError {
    fn from(e: MigiiError) -> Self {
        Self(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(match e {
            StoreError::Invalid(msg) => MigiiError::Validation(msg),
            StoreError::NotFound { kind, id } => MigiiError::NotFound { kind, id },
            StoreError::Conflict(msg) => MigiiError::Conflict(msg),
            StoreError::InvalidTransition { from, to } => {
                MigiiError::Conflict(format!("cannot change status from {from} to {to}"))
            }
            StoreError::Database(e) => MigiiError::Database(e.to_string()),
            StoreError::Serialization(e) => MigiiError::Serialization(e),
            StoreError::Poisoned => MigiiError::Internal("store lock poisoned".into()),
        })
    }
}

impl From<NotificationError> for ApiError {
    fn from(e: NotificationError) -> Self {
        Self(match e {
            NotificationError::NotFound(id) => MigiiError::NotFound {
                kind: "notification",
                id,
            },
            NotificationError::InvalidTransition { from, to } => {
                MigiiError::Conflict(format!("cannot change notification from {from} to {to}"))
            }
            NotificationError::Invalid(msg) => MigiiError::Validation(msg),
            NotificationError::Database(e) => MigiiError::Database(e.to_string()),
            NotificationError::Serialization(e) => MigiiError::Serialization(e),
            NotificationError::Poisoned => MigiiError::Internal("notification lock poisoned".into()),
            NotificationError::Store(e) => return ApiError::from(e),
        })
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            debug!(code = self.0.code(), error = %self.0, "request rejected");
        }

        let mut response = (status, Json(ErrorBody::new(self.0.to_string()))).into_response();
        if let MigiiError::RateLimited { retry_after_secs } = self.0 {
            if let Ok(v) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
