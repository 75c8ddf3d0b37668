//! Ordered request pipeline
//!
//! The stages every request passes through, outermost first. Ordering lives
//! in [`PIPELINE`] rather than in the sequence of `.layer()` calls, and
//! [`apply`] is the only place that turns it into layers.

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;

use crate::config::AppConfig;
use crate::error::{error_responder, panic_response};
use crate::middleware::{body, cors, rate_limit, request_log, security_headers, uploads};
use crate::state::AppContext;

/// One pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SecurityHeaders,
    Compression,
    RateLimit,
    Cors,
    BodyParsing,
    RequestLog,
    StaticUploads,
}

/// What a stage may do with a request besides passing it on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageContract {
    /// Always forwards the request; may decorate the response
    PassThrough,
    /// May answer without reaching the router
    ShortCircuit,
    /// May raise an error for the error responder
    Fail,
}

/// Every stage, in the order a request meets them
pub const PIPELINE: [Stage; 7] = [
    Stage::SecurityHeaders,
    Stage::Compression,
    Stage::RateLimit,
    Stage::Cors,
    Stage::BodyParsing,
    Stage::RequestLog,
    Stage::StaticUploads,
];

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Self::SecurityHeaders => "security-headers",
            Self::Compression => "compression",
            Self::RateLimit => "rate-limit",
            Self::Cors => "cors",
            Self::BodyParsing => "body-parsing",
            Self::RequestLog => "request-log",
            Self::StaticUploads => "static-uploads",
        }
    }

    pub const fn contracts(self) -> &'static [StageContract] {
        match self {
            Self::SecurityHeaders | Self::Compression | Self::RequestLog => {
                &[StageContract::PassThrough]
            }
            Self::RateLimit => &[StageContract::ShortCircuit],
            // Preflight requests are answered by the CORS layer itself
            Self::Cors => &[StageContract::ShortCircuit],
            Self::BodyParsing => &[StageContract::Fail],
            Self::StaticUploads => &[StageContract::ShortCircuit, StageContract::Fail],
        }
    }

    /// Request logging only runs in development
    pub fn is_enabled(self, config: &AppConfig) -> bool {
        match self {
            Self::RequestLog => config.environment.is_development(),
            _ => true,
        }
    }

    fn wrap(self, router: Router, ctx: &AppContext) -> Router {
        match self {
            Self::SecurityHeaders => router.layer(from_fn(security_headers::security_headers)),
            Self::Compression => router.layer(CompressionLayer::new()),
            Self::RateLimit => router.layer(from_fn_with_state(
                ctx.clone(),
                rate_limit::limit_api_requests,
            )),
            Self::Cors => router.layer(cors::cors_layer(ctx.config())),
            Self::BodyParsing => router
                .layer(from_fn_with_state(ctx.clone(), body::parse_body))
                // Inflated size counts against the limit
                .layer(RequestDecompressionLayer::new())
                .layer(DefaultBodyLimit::max(ctx.config().body_limit)),
            Self::RequestLog => router.layer(request_log::request_log_layer()),
            Self::StaticUploads => {
                router.layer(from_fn_with_state(ctx.clone(), uploads::serve_uploads))
            }
        }
    }
}

/// Stages enabled for `config`, outermost first
pub fn active_stages(config: &AppConfig) -> Vec<Stage> {
    PIPELINE
        .iter()
        .copied()
        .filter(|stage| stage.is_enabled(config))
        .collect()
}

/// Wrap a fully routed application in the pipeline.
///
/// Layers added later sit further out, so stages are applied innermost
/// first. The error responder goes directly inside the rate limiter: every
/// stage after the limiter, the router and the not-found fallback report
/// through it, while 429s leave untouched.
pub fn apply(router: Router, ctx: &AppContext) -> Router {
    let mut router = router.layer(CatchPanicLayer::custom(panic_response));

    for stage in PIPELINE.iter().rev().copied() {
        if stage == Stage::RateLimit {
            router = router.layer(from_fn_with_state(ctx.clone(), error_responder));
        }
        if stage.is_enabled(ctx.config()) {
            router = stage.wrap(router, ctx);
        }
    }

    router
}
