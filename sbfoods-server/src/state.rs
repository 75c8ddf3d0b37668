//! Application context shared across stages and handlers

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DatabaseSlot;
use crate::middleware::rate_limit::RateLimiter;

/// Process-wide state, built once at startup and injected everywhere.
///
/// Cloning is cheap: everything sits behind one `Arc`.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    config: AppConfig,
    database: DatabaseSlot,
    rate_limiter: RateLimiter,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.clone());
        Self {
            inner: Arc::new(AppContextInner {
                config,
                database: DatabaseSlot::new(),
                rate_limiter,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Database handle; empty until the startup connect succeeds
    pub fn database(&self) -> &DatabaseSlot {
        &self.inner.database
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }
}
