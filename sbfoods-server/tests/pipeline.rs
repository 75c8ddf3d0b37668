//! Router-level tests: the whole pipeline driven with `oneshot`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use async_trait::async_trait;
use axum::extract::connect_info::MockConnectInfo;
use axum::extract::State;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use sbfoods_server::config::{RATE_LIMIT_MESSAGE, RATE_LIMIT_WINDOW};
use sbfoods_server::error::ErrorBody;
use sbfoods_server::routes::HealthResponse;
use sbfoods_server::{
    build_router, ApiError, AppConfig, AppContext, Collaborators, Database, DbError,
    Environment, ParsedBody, Resource,
};

fn peer(last: u8) -> SocketAddr {
    SocketAddr::from(([203, 0, 113, last], 51000))
}

fn app_with(config: AppConfig, collaborators: Collaborators) -> Router {
    let ctx = AppContext::new(config);
    build_router(&ctx, collaborators).layer(MockConnectInfo(peer(1)))
}

fn app(config: AppConfig) -> Router {
    app_with(config, Collaborators::new())
}

fn development() -> AppConfig {
    AppConfig {
        environment: Environment::Development,
        ..AppConfig::default()
    }
}

fn production() -> AppConfig {
    AppConfig {
        environment: Environment::Production,
        frontend_origins: vec!["https://sbfoods.example".to_string()],
        ..AppConfig::default()
    }
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn burning_kitchen() -> StatusCode {
    panic!("kitchen on fire")
}

/// Collaborators standing in for the real resource modules
fn kitchen() -> Collaborators {
    let dishes = Router::new()
        .route("/", post(|ParsedBody(body): ParsedBody| async move { Json(body) }))
        .route(
            "/{id}",
            get(|| async { Err::<(), _>(ApiError::internal("dish index corrupted")) }),
        );

    let cart = Router::new().route(
        "/",
        post(|Json(item): Json<Value>| async move {
            if item["quantity"].as_u64().unwrap_or(0) == 0 {
                return Err(ApiError::Conflict("Quantity must be positive".to_string()));
            }
            Ok(Json(json!({ "success": true, "item": item })))
        }),
    );

    let orders = Router::new().route("/", get(burning_kitchen));

    Collaborators::new()
        .mount(Resource::Dishes, dishes)
        .mount(Resource::Cart, cart)
        .mount(Resource::Orders, orders)
}

#[tokio::test]
async fn health_reports_running() {
    let app = app(development());

    let before = Utc::now();
    let response = send(&app, get_request("/api/health")).await;
    let after = Utc::now();

    assert_eq!(response.status(), StatusCode::OK);
    let body: HealthResponse = json_body(response).await;
    assert!(body.success);
    assert_eq!(body.message, "SB Foods API is running!");
    assert_eq!(body.environment.as_deref(), Some("development"));

    let stamp = DateTime::parse_from_rfc3339(&body.timestamp).unwrap();
    assert!(stamp >= before - chrono::Duration::milliseconds(1));
    assert!(stamp <= after);
}

#[tokio::test]
async fn health_omits_unset_environment() {
    let app = app(AppConfig::default());

    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(body.get("environment").is_none());
}

#[tokio::test]
async fn unknown_path_is_structured_404() {
    let app = app(AppConfig::default());

    let response = send(&app, get_request("/api/nonexistent")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let body: ErrorBody = json_body(response).await;
    assert!(!body.success);
    assert_eq!(body.message, "Not Found - /api/nonexistent");
}

#[tokio::test]
async fn unmounted_group_is_404() {
    let app = app_with(AppConfig::default(), kitchen());

    let response = send(&app, get_request("/api/reviews")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Not Found - /api/reviews");
}

#[tokio::test]
async fn security_headers_on_success_and_error() {
    let app = app(AppConfig::default());

    for uri in ["/api/health", "/api/nonexistent", "/nowhere"] {
        let response = send(&app, get_request(uri)).await;
        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff", "{uri}");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN", "{uri}");
        assert!(headers.contains_key("content-security-policy"), "{uri}");
        assert!(headers.contains_key("strict-transport-security"), "{uri}");
    }
}

#[tokio::test]
async fn the_101st_api_request_is_limited() {
    let app = app(AppConfig::default());

    // Not under /api/, so never counted
    for _ in 0..5 {
        let response = send(&app, get_request("/nowhere")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    for n in 1..=100u32 {
        let response = send(&app, get_request("/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK, "request {n}");
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
        assert_eq!(
            response.headers()["x-ratelimit-remaining"],
            (100 - n).to_string().as_str()
        );
    }

    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body: ErrorBody = json_body(response).await;
    assert!(!body.success);
    assert_eq!(body.message, RATE_LIMIT_MESSAGE);
    assert!(body.stack.is_none());

    // Unknown API paths count against the same quota
    let response = send(&app, get_request("/api/nonexistent")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn quota_is_per_client_ip() {
    let ctx = AppContext::new(AppConfig::default());
    let router = build_router(&ctx, Collaborators::new());
    let first = router.clone().layer(MockConnectInfo(peer(1)));
    let second = router.layer(MockConnectInfo(peer(2)));

    for _ in 0..100 {
        send(&first, get_request("/api/health")).await;
    }
    let response = send(&first, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(&second, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test(start_paused = true)]
async fn window_resets_after_fifteen_minutes() {
    let app = app(AppConfig::default());

    for _ in 0..100 {
        send(&app, get_request("/api/health")).await;
    }
    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(RATE_LIMIT_WINDOW).await;

    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "99");
}

#[tokio::test]
async fn oversized_json_body_is_413_and_server_keeps_serving() {
    let app = app_with(AppConfig::default(), kitchen());

    let mut payload = b"{\"blob\":\"".to_vec();
    payload.resize(11 * 1024 * 1024, b'a');
    payload.extend_from_slice(b"\"}");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: ErrorBody = json_body(response).await;
    assert!(!body.success);
    assert!(body.message.contains("10 MB"), "{}", body.message);

    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn declared_oversized_length_is_rejected_up_front() {
    let app = app_with(AppConfig::default(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, (20 * 1024 * 1024).to_string())
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let app = app_with(AppConfig::default(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = json_body(response).await;
    assert!(body.message.starts_with("Malformed JSON body"));
}

#[tokio::test]
async fn form_body_reaches_collaborator_as_parsed_value() {
    let app = app_with(AppConfig::default(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=Masala+Dosa&tag=veg&tag=south"))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body, json!({ "name": "Masala Dosa", "tag": ["veg", "south"] }));
}

#[tokio::test]
async fn nested_form_fields_reach_collaborator_as_objects() {
    let app = app_with(AppConfig::default(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(
            "address%5Bcity%5D=Pune&address[zip]=411001&items[0][dish]=d-1&items[1][dish]=d-2",
        ))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(
        body,
        json!({
            "address": { "city": "Pune", "zip": "411001" },
            "items": [{ "dish": "d-1" }, { "dish": "d-2" }]
        })
    );
}

#[tokio::test]
async fn gzip_request_body_is_inflated_before_parsing() {
    let app = app_with(AppConfig::default(), kitchen());

    // Borrow a gzip payload from the response compressor
    let request = Request::builder()
        .uri("/api/health")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
    let gzipped = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(gzipped))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "SB Foods API is running!");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/dishes")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_ENCODING, "compress")
        .body(Body::from("{}"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn raw_json_is_still_readable_after_parsing() {
    let app = app_with(AppConfig::default(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/cart")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"dishId":"d-42","quantity":2}"#))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["item"]["dishId"], "d-42");
}

#[tokio::test]
async fn collaborator_error_keeps_its_status() {
    let app = app_with(production(), kitchen());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/cart")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"dishId":"d-42","quantity":0}"#))
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Quantity must be positive");
    assert!(body.stack.is_none());
}

#[tokio::test]
async fn wrong_method_is_structured_405() {
    let app = app_with(AppConfig::default(), kitchen());

    let response = send(&app, get_request("/api/cart")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Method Not Allowed");
}

#[tokio::test]
async fn development_shows_stack() {
    let app = app_with(development(), kitchen());

    let response = send(&app, get_request("/api/dishes/7")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "dish index corrupted");
    assert!(body.stack.is_some());
}

#[tokio::test]
async fn production_hides_server_error_details() {
    let app = app_with(production(), kitchen());

    let response = send(&app, get_request("/api/dishes/7")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Internal Server Error");
    assert!(body.stack.is_none());

    let response = send(&app, get_request("/api/nonexistent")).await;
    let body: ErrorBody = json_body(response).await;
    assert!(body.stack.is_none());
}

#[tokio::test]
async fn panicking_handler_becomes_500() {
    let app = app_with(development(), kitchen());

    let response = send(&app, get_request("/api/orders")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Handler panicked: kitchen on fire");

    let response = send(&app, get_request("/api/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

/// Driver client that never dials out; enough to hand a handle to routes
struct IdleMongo(mongodb::Client);

#[async_trait]
impl Database for IdleMongo {
    fn host(&self) -> &str {
        "127.0.0.1:1"
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn close(&self) {}

    fn client(&self) -> Option<&mongodb::Client> {
        Some(&self.0)
    }
}

#[tokio::test]
async fn collaborator_reads_database_from_context() {
    let ctx = AppContext::new(AppConfig::default());
    let menu = Router::new().route(
        "/",
        get(|State(ctx): State<AppContext>| async move {
            let db = ctx.database().default_database()?;
            Ok::<_, ApiError>(Json(json!({ "database": db.name() })))
        }),
    );
    let app = build_router(&ctx, Collaborators::new().mount(Resource::Dishes, menu))
        .layer(MockConnectInfo(peer(1)));

    // Startup connect still pending
    let response = send(&app, get_request("/api/dishes")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let client = mongodb::Client::with_uri_str("mongodb://127.0.0.1:1/sbfoods")
        .await
        .unwrap();
    assert!(ctx.database().install(Arc::new(IdleMongo(client))));

    let response = send(&app, get_request("/api/dishes")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["database"], "sbfoods");
}

async fn from_vite(app: &Router) -> Response {
    let request = Request::builder()
        .uri("/api/health")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

#[tokio::test]
async fn cors_follows_environment() {
    let response = from_vite(&app(AppConfig::default())).await;
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );

    let response = from_vite(&app(production())).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn uploads_are_served_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("dishes")).unwrap();
    std::fs::write(dir.path().join("dishes").join("dosa.txt"), "crispy").unwrap();

    let app = app(AppConfig {
        uploads_dir: dir.path().to_path_buf(),
        ..AppConfig::default()
    });

    let response = send(&app, get_request("/uploads/dishes/dosa.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(!response.headers().contains_key("x-ratelimit-limit"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"crispy");

    let response = send(&app, get_request("/uploads/dishes/missing.png")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = json_body(response).await;
    assert_eq!(body.message, "Not Found - /uploads/dishes/missing.png");
}

#[tokio::test]
async fn upload_directory_redirect_keeps_prefix() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("dishes")).unwrap();
    std::fs::write(dir.path().join("dishes").join("index.html"), "menu").unwrap();

    let app = app(AppConfig {
        uploads_dir: dir.path().to_path_buf(),
        ..AppConfig::default()
    });

    let response = send(&app, get_request("/uploads/dishes")).await;
    assert!(response.status().is_redirection());
    assert_eq!(response.headers()[header::LOCATION], "/uploads/dishes/");

    let response = send(&app, get_request("/uploads/dishes/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"menu");
}

#[tokio::test]
async fn responses_are_compressed_when_asked() {
    let app = app(AppConfig::default());

    let request = Request::builder()
        .uri("/api/health")
        .header(header::ACCEPT_ENCODING, "gzip")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_ENCODING], "gzip");
}
