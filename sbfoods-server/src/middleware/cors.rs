//! Cross-origin policy
//!
//! - production: only the configured `FRONTEND_URL` origins
//! - anything else: the local dev servers (`localhost:3000`, `localhost:5173`)
//!
//! Credentials are allowed, so methods and headers are mirrored from the
//! preflight instead of using wildcards. Unlisted origins simply get no
//! `Access-Control-Allow-Origin` header.

use axum::http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::AppConfig;

pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(%origin, error = %e, "ignoring unusable CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        warn!(
            environment = %config.environment,
            "CORS: no allowed origins configured - cross-origin requests will be refused"
        );
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}
