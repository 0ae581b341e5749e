use axum::Json;
use migii_protocol::HealthResponse;

/// GET /api/health: liveness probe.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
