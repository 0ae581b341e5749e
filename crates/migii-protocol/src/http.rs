use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// `GET /api/health` body.
/// Wire: `{ "status": "ok", "timestamp": "2026-01-01T00:00:00.000Z" }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn ok_at(now: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn ok() -> Self {
        Self::ok_at(Utc::now())
    }
}

/// Error body returned by every `/api/*` route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
