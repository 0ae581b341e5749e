use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use migii_core::config::RateLimitConfig;
use migii_core::MigiiError;
use tracing::warn;

use crate::app::AppState;
use crate::http::error::ApiError;

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    trust_forwarded_for: bool,
    windows: DashMap<IpAddr, Window>,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs.max(1)),
            max_requests: config.max_requests,
            trust_forwarded_for: config.trust_forwarded_for,
            windows: DashMap::new(),
        }
    }

    /// Count one request from `ip` at `now`. Over the cap, returns the
    /// seconds until the window resets.
    pub fn check(&self, ip: IpAddr, now: Instant) -> Result<(), u64> {
        let mut entry = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        if entry.count >= self.max_requests {
            let remaining = self.window.saturating_sub(elapsed);
            return Err(remaining.as_secs().max(1));
        }
        entry.count += 1;
        Ok(())
    }

    /// Forget windows that have fully elapsed.
    pub fn prune(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
    }

    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

/// Middleware applied to the `/api` routes that are rate limited.
pub async fn enforce(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let ip = client_ip(&req, state.rate_limiter.trust_forwarded_for);
    let now = Instant::now();
    if let Err(retry_after_secs) = state.rate_limiter.check(ip, now) {
        warn!(%ip, path = %req.uri().path(), "rate limit exceeded");
        return ApiError(MigiiError::RateLimited { retry_after_secs }).into_response();
    }
    if state.rate_limiter.tracked() > 10_000 {
        state.rate_limiter.prune(now);
    }
    next.run(req).await
}

/// The peer address. With `trust_forwarded_for`, the first
/// `X-Forwarded-For` hop wins when it parses.
fn client_ip(req: &Request, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window_secs: 900,
            max_requests: max,
            trust_forwarded_for: false,
        })
    }

    #[test]
    fn allows_up_to_cap_then_rejects() {
        let rl = limiter(3);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(rl.check(ip, t0).is_ok());
        }
        let retry = rl.check(ip, t0 + Duration::from_secs(60)).unwrap_err();
        assert_eq!(retry, 840);
    }

    #[test]
    fn window_resets_after_expiry() {
        let rl = limiter(1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let t0 = Instant::now();
        assert!(rl.check(ip, t0).is_ok());
        assert!(rl.check(ip, t0).is_err());
        assert!(rl.check(ip, t0 + Duration::from_secs(900)).is_ok());
    }

    #[test]
    fn clients_are_counted_separately() {
        let rl = limiter(1);
        let t0 = Instant::now();
        assert!(rl.check("10.0.0.1".parse().unwrap(), t0).is_ok());
        assert!(rl.check("10.0.0.2".parse().unwrap(), t0).is_ok());
        assert_eq!(rl.tracked(), 2);

        rl.prune(t0 + Duration::from_secs(901));
        assert_eq!(rl.tracked(), 0);
    }

    fn request(forwarded_for: Option<&str>, peer: &str) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/jobs");
        if let Some(xff) = forwarded_for {
            builder = builder.header("x-forwarded-for", xff);
        }
        let mut req = builder.body(axum::body::Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        req
    }

    #[test]
    fn forwarded_for_is_ignored_unless_trusted() {
        let req = request(Some("203.0.113.9, 10.0.0.1"), "192.0.2.7:51000");
        assert_eq!(client_ip(&req, false), "192.0.2.7".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(&req, true), "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn unparsable_forwarded_for_falls_back_to_peer() {
        let req = request(Some("not-an-ip"), "192.0.2.7:51000");
        assert_eq!(client_ip(&req, true), "192.0.2.7".parse::<IpAddr>().unwrap());
        let bare = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_ip(&bare, true), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
}
