//! Health check route

use axum::extract::State;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppContext;

pub const HEALTH_MESSAGE: &str = "SB Foods API is running!";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    /// RFC 3339, UTC, millisecond precision
    pub timestamp: String,
    /// Absent when `NODE_ENV` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// GET /api/health
///
/// Answers from the process alone; the database is not consulted.
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: HEALTH_MESSAGE.to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        environment: ctx.config().environment.name().map(str::to_string),
    })
}
