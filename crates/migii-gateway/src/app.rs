use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use migii_core::config::{MigiiConfig, MAX_PAYLOAD_BYTES};
use migii_notifications::{NotificationGateway, ReviewDesk};
use migii_store::Store;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::http::{self, rate_limit::RateLimiter};
use crate::ws::hub::BroadcastHub;

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: MigiiConfig,
    pub hub: Arc<BroadcastHub>,
    pub store: Arc<Store>,
    pub notifications: Arc<NotificationGateway>,
    pub reviews: ReviewDesk,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: MigiiConfig, store: Arc<Store>, notifications: Arc<NotificationGateway>) -> Self {
        let rate_limiter = RateLimiter::new(&config.rate_limit);
        let reviews = ReviewDesk::new(store.clone(), notifications.clone());
        Self {
            config,
            hub: Arc::new(BroadcastHub::new()),
            store,
            notifications,
            reviews,
            rate_limiter,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/workers/register", post(http::workers::register))
        .route("/api/workers", get(http::workers::list))
        .route(
            "/api/workers/{id}",
            get(http::workers::get_one)
                .put(http::workers::replace)
                .delete(http::workers::remove),
        )
        .route("/api/workers/{id}/status", patch(http::workers::set_status))
        .route("/api/jobs", post(http::jobs::create).get(http::jobs::list))
        .route("/api/jobs/{id}/approve", post(http::jobs::approve))
        .route("/api/jobs/{id}/reject", post(http::jobs::reject))
        .route("/api/jobs/{id}/assign", post(http::jobs::assign))
        .route("/api/support", post(http::support::submit))
        .route("/api/notifications", get(http::notifications::list))
        .route("/api/notifications/read-all", post(http::notifications::read_all))
        .route("/api/notifications/{id}/read", post(http::notifications::read))
        .route("/api/notifications/{id}/approve", post(http::notifications::approve))
        .route("/api/notifications/{id}/reject", post(http::notifications::reject))
        .route("/api/notifications/{id}/resolve", post(http::notifications::resolve))
        .route("/api/notifications/{id}/decline", post(http::notifications::decline))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            http::rate_limit::enforce,
        ));

    let timeout = Duration::from_millis(state.config.server.request_timeout_ms);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/", get(crate::ws::connection::ws_handler))
        .route("/api/health", get(http::health::health_handler))
        .merge(api)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Allow the configured origins, or any origin when the list is empty.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}
