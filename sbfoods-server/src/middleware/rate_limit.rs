//! Per-IP rate limiting for `/api/` routes.
//!
//! Fixed window counter: each client IP gets a window that starts with its
//! first request. Requests beyond the quota inside the window are answered
//! with 429 right here and never reach the router or the error responder.
//!
//! Windows live in a sharded `DashMap` so concurrent requests from different
//! clients do not contend. Expired windows are dropped by [`spawn_sweeper`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::extract::connect_info::{ConnectInfo, MockConnectInfo};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::ErrorBody;
use crate::state::AppContext;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32, reset_after: Duration },
    Limited { reset_after: Duration },
}

/// Fixed window request counter keyed by client IP
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request from `ip` and decide whether it may proceed
    pub fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let window_len = self.config.window;
        let mut window = self.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= window_len {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        window.count = window.count.saturating_add(1);
        let reset_after = window_len.saturating_sub(now.duration_since(window.started));

        if window.count > self.config.max_requests {
            Decision::Limited { reset_after }
        } else {
            Decision::Allowed {
                remaining: self.config.max_requests - window.count,
                reset_after,
            }
        }
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window_len = self.config.window;
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.started) < window_len);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a live window
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Periodically purge expired windows so idle clients do not pile up
pub fn spawn_sweeper(ctx: AppContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = ctx.rate_limiter().config().window;
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = ctx.rate_limiter().sweep();
            if removed > 0 {
                debug!(removed, "swept expired rate limit windows");
            }
        }
    })
}

/// Whether a path is subject to the API quota
pub fn is_limited_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Rate limiting stage
pub async fn limit_api_requests(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    if !is_limited_path(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = client_ip(&request);
    let limiter = ctx.rate_limiter();
    let max = limiter.config().max_requests;

    match limiter.check(ip) {
        Decision::Allowed {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            set_quota_headers(response.headers_mut(), max, remaining, reset_after);
            response
        }
        Decision::Limited { reset_after } => {
            warn!(%ip, path = request.uri().path(), "rate limit exceeded");
            let body = ErrorBody {
                success: false,
                message: limiter.config().message.to_string(),
                stack: None,
            };
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            set_quota_headers(headers, max, 0, reset_after);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(ceil_secs(reset_after)));
            response
        }
    }
}

fn set_quota_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_after: Duration) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset_after)));
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Peer address of the connection. Tests inject it with `MockConnectInfo`.
fn client_ip(request: &Request) -> IpAddr {
    let extensions = request.extensions();
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .or_else(|| {
            extensions
                .get::<MockConnectInfo<SocketAddr>>()
                .map(|MockConnectInfo(addr)| addr.ip())
        })
        .map(|ip| ip.to_canonical())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
