//! Error types and the centralized error responder
//!
//! Every failure (handler errors, stage errors, extractor rejections, panics)
//! ends up as an [`ErrorReport`] attached to the response. The
//! [`error_responder`] middleware is the single place that turns a report into
//! the JSON body clients see, using the environment to decide how much to show.

use std::any::Any;
use std::error::Error as StdError;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Environment;
use crate::db::DbError;
use crate::state::AppContext;

/// Largest plain-text error body lifted into a JSON message
const MAX_PLAIN_ERROR_BODY: usize = 64 * 1024;

/// Message shown instead of 5xx details outside development
const GENERIC_SERVER_ERROR: &str = "Internal Server Error";

pub type ApiResult<T> = Result<T, ApiError>;

/// Request-level error raised by a stage, the router or a collaborator
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Status chosen by the caller. Non-error statuses fall back to 500.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("{0}")]
    Internal(#[from] Box<dyn StdError + Send + Sync>),
}

impl ApiError {
    /// 404 for a path nothing matched
    pub fn not_found(path: impl AsRef<str>) -> Self {
        Self::NotFound(format!("Not Found - {}", path.as_ref()))
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn internal(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Internal(err.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Status { status, .. } if is_error_status(*status) => *status,
            Self::Status { .. } | Self::Database(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            status: self.status(),
            message: self.to_string(),
            stack: Some(source_chain(self)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report();
        if report.status.is_server_error() {
            tracing::error!(status = report.status.as_u16(), error = %report.message, "request failed");
        } else {
            tracing::debug!(status = report.status.as_u16(), error = %report.message, "request rejected");
        }
        report.into_response()
    }
}

/// Failure details carried to the error responder as a response extension
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub message: String,
    /// Source chain; only ever rendered in development
    pub stack: Option<String>,
}

impl ErrorReport {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            stack: None,
        }
    }

    /// JSON body for this report under `environment`
    pub fn body(&self, environment: &Environment) -> ErrorBody {
        let message = if self.status.is_server_error() && !environment.is_development() {
            GENERIC_SERVER_ERROR.to_string()
        } else {
            self.message.clone()
        };

        ErrorBody {
            success: false,
            message,
            stack: if environment.is_development() {
                self.stack.clone()
            } else {
                None
            },
        }
    }
}

/// Without the responder in front (e.g. a collaborator tested on its own)
/// the report still renders with production rules.
impl IntoResponse for ErrorReport {
    fn into_response(self) -> Response {
        let body = self.body(&Environment::Production);
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Wire shape of every error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Terminal error responder.
///
/// Renders any [`ErrorReport`] for the configured environment and lifts bare
/// error responses (extractor rejections, 405s, file service errors) into the
/// same JSON shape. Headers set by earlier stages are preserved.
pub async fn error_responder(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    finalize(response, &ctx.config().environment).await
}

async fn finalize(response: Response, environment: &Environment) -> Response {
    if let Some(report) = response.extensions().get::<ErrorReport>().cloned() {
        return rewrite_body(response, &report, environment);
    }

    if !is_error_status(response.status()) || is_json(&response) {
        return response;
    }

    let status = response.status();
    let (parts, body) = response.into_parts();
    let text = match to_bytes(body, MAX_PLAIN_ERROR_BODY).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).trim().to_string(),
        Err(_) => String::new(),
    };
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("Error").to_string()
    } else {
        text
    };

    let report = ErrorReport::new(status, message);
    rewrite_body(Response::from_parts(parts, Body::empty()), &report, environment)
}

fn rewrite_body(response: Response, report: &ErrorReport, environment: &Environment) -> Response {
    let (mut parts, _) = response.into_parts();
    let (_, body) = Json(report.body(environment)).into_response().into_parts();

    parts.status = report.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.extensions.remove::<ErrorReport>();

    Response::from_parts(parts, body)
}

/// `CatchPanicLayer` handler: a panicking handler becomes a 500 report
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    tracing::error!(panic = %detail, "handler panicked");
    ErrorReport {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("Handler panicked: {detail}"),
        stack: Some(detail),
    }
    .into_response()
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn source_chain(err: &dyn StdError) -> String {
    let mut chain = format!("Error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(&format!("\n    caused by: {cause}"));
        source = cause.source();
    }
    chain
}
