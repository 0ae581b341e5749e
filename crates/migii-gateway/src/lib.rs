//! MIGII gateway: realtime WebSocket hub plus the `/api` HTTP surface.

pub mod app;
pub mod http;
pub mod relay;
pub mod ws;

pub use app::{build_router, AppState};
