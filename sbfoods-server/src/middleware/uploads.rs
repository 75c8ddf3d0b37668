//! Static files under `/uploads`
//!
//! `GET`/`HEAD` requests below the prefix are answered from the uploads
//! directory by `ServeDir` and never reach the router. Other methods fall
//! through.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::ApiError;
use crate::state::AppContext;

pub const UPLOADS_PREFIX: &str = "/uploads";

/// Static asset stage
pub async fn serve_uploads(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let Some(file_path) = upload_path(request.uri().path()) else {
        return next.run(request).await;
    };
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return next.run(request).await;
    }

    let original_path = request.uri().path().to_string();
    let (mut parts, body) = request.into_parts();
    parts.uri = match rewrite_uri(&parts.uri, &file_path) {
        Ok(uri) => uri,
        Err(err) => return err.into_response(),
    };

    let service = ServeDir::new(&ctx.config().uploads_dir);
    let mut response = match service.oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        return ApiError::not_found(original_path).into_response();
    }
    if response.status().is_redirection() {
        restore_prefix(response.headers_mut());
    }
    response.map(Body::new)
}

/// `ServeDir` redirects directories to their slash form relative to the
/// rewritten path; put the mount prefix back on absolute locations.
fn restore_prefix(headers: &mut HeaderMap) {
    let Some(location) = headers
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .filter(|location| location.starts_with('/'))
    else {
        return;
    };
    if let Ok(value) = HeaderValue::from_str(&format!("{UPLOADS_PREFIX}{location}")) {
        headers.insert(header::LOCATION, value);
    }
}

/// Path below the prefix, or `None` when the request is not for uploads
fn upload_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix(UPLOADS_PREFIX)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

fn rewrite_uri(uri: &Uri, path: &str) -> Result<Uri, ApiError> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload path: {e}")))
}
