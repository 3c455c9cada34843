//! Integration tests for the admin webhook endpoints.
//!
//! Drives the full router (auth, timeout and tracing layers included)
//! against a running notification engine over an in-memory registry.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use spvwallet_api::{create_router, AppState};
use spvwallet_core::RealClock;
use spvwallet_testing::NotificationEnv;
use tower::ServiceExt;

const SUBSCRIBER: &str = "http://localhost:8080/notify";

fn app(env: &NotificationEnv) -> Router {
    create_router(AppState::new(env.clock.shared()).with_notifications(env.manager.clone()))
}

fn request(method: Method, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri("/admin/webhooks");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request build"),
        None => builder.body(Body::empty()).expect("request build"),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("request execution");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

fn subscription(url: &str) -> Value {
    json!({"url": url, "tokenHeader": "X-Auth", "tokenValue": "secret"})
}

#[tokio::test]
async fn subscribe_then_list() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let (status, _) = send(&app, request(Method::POST, Some(subscription(SUBSCRIBER)))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request(Method::GET, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"url": SUBSCRIBER, "banned": false}]));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn duplicate_subscribe_keeps_one_entry() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    for _ in 0..2 {
        let (status, _) = send(&app, request(Method::POST, Some(subscription(SUBSCRIBER)))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, body) = send(&app, request(Method::GET, None)).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn unsubscribe_removes_entry() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    send(&app, request(Method::POST, Some(subscription(SUBSCRIBER)))).await;
    let (status, _) = send(&app, request(Method::DELETE, Some(json!({"url": SUBSCRIBER})))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request(Method::GET, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn disabled_notifications_answer_not_found() {
    let app = create_router(AppState::new(RealClock::shared()));

    for request in [
        request(Method::GET, None),
        request(Method::POST, Some(subscription(SUBSCRIBER))),
        request(Method::DELETE, Some(json!({"url": SUBSCRIBER}))),
        request(Method::POST, None),
    ] {
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "notifications-disabled");
    }
}

#[tokio::test]
async fn unknown_url_is_not_found() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let (status, body) =
        send(&app, request(Method::DELETE, Some(json!({"url": "http://unknown.example"})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "webhook-subscription-not-found");
    assert!(body["message"].is_string());

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_url_is_rejected() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let (status, body) =
        send(&app, request(Method::DELETE, Some(json!({"url": "http://test.com/%"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "webhook-url-invalid");

    let (status, body) =
        send(&app, request(Method::POST, Some(subscription("ftp://files.example")))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "webhook-url-invalid");

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn missing_fields_are_reported_individually() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let cases = [
        (json!({"tokenHeader": "X-Auth", "tokenValue": "s"}), "webhook-url-required"),
        (json!({"url": SUBSCRIBER, "tokenValue": "s"}), "webhook-token-header-required"),
        (json!({"url": SUBSCRIBER, "tokenHeader": "X-Auth", "tokenValue": ""}), "webhook-token-value-required"),
    ];

    for (body, code) in cases {
        let (status, response) = send(&app, request(Method::POST, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["code"], code);
    }

    let (status, response) = send(&app, request(Method::DELETE, Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "webhook-url-required");

    assert_eq!(env.manager.list().await.unwrap(), vec![]);
    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn token_that_cannot_be_sent_as_header_is_rejected() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let cases = [
        (json!({"url": SUBSCRIBER, "tokenHeader": "X Auth", "tokenValue": "secret"}), "webhook-token-header-invalid"),
        (json!({"url": SUBSCRIBER, "tokenHeader": "X-Auth", "tokenValue": "secret\r\nX-Injected: 1"}), "webhook-token-value-invalid"),
    ];

    for (body, code) in cases {
        let (status, response) = send(&app, request(Method::POST, Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["code"], code);
    }

    assert_eq!(env.manager.list().await.unwrap(), vec![]);
    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn unparseable_body_cannot_bind() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/admin/webhooks")
        .body(Body::from("{not json"))
        .expect("request build");
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "cannot-bind-request");

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn registry_failure_maps_to_operation_code() {
    let env = NotificationEnv::new().unwrap();
    let app = app(&env);

    env.repository.set_unavailable(true).await;

    let (status, body) = send(&app, request(Method::POST, Some(subscription(SUBSCRIBER)))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "webhook-subscription-failed");

    let (status, body) = send(&app, request(Method::GET, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "webhook-get-all");

    let (status, body) = send(&app, request(Method::DELETE, Some(json!({"url": SUBSCRIBER})))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "webhook-unsubscription-failed");

    env.repository.set_unavailable(false).await;

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn admin_key_guards_webhook_routes() {
    let env = NotificationEnv::new().unwrap();
    let app = create_router(
        AppState::new(env.clock.shared())
            .with_notifications(env.manager.clone())
            .with_admin_key("admin-secret"),
    );

    let (status, body) = send(&app, request(Method::GET, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let wrong = Request::builder()
        .uri("/admin/webhooks")
        .header(AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .expect("request build");
    let (status, _) = send(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/admin/webhooks")
        .header(AUTHORIZATION, "Bearer admin-secret")
        .body(Body::empty())
        .expect("request build");
    let (status, body) = send(&app, authorized).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = send(
        &app,
        Request::builder().uri("/live").body(Body::empty()).expect("request build"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    env.shutdown().await.unwrap();
}

#[tokio::test]
async fn responses_carry_request_id() {
    let env = NotificationEnv::new().unwrap();
    let response = app(&env).oneshot(request(Method::GET, None)).await.expect("request execution");

    let request_id = response.headers().get("X-Request-Id").expect("request id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);

    env.shutdown().await.unwrap();
}
