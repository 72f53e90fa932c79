//! Health, index and API document endpoints.

mod common;

use axum::http::StatusCode;
use common::TestApp;

#[tokio::test]
async fn health_check_returns_200() {
    let app = TestApp::spawn();

    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["service"], "user-service");
    assert!(response.headers.contains_key("x-request-id"));
    assert_eq!(response.headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn index_lists_endpoints() {
    let app = TestApp::spawn();

    let response = app.get("/", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["endpoints"]["auth"], "/api/auth");
    assert_eq!(response.body["endpoints"]["users"], "/api/users");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::spawn();

    let response = app.get("/.well-known/openapi.json", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["paths"]["/api/auth/login"].is_object());
    assert!(response.body["paths"]["/api/users/{id}"].is_object());
    assert!(response.body["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn openapi_document_is_served_with_swagger_disabled() {
    let app = TestApp::with_env(&[("ENABLE_SWAGGER", "disabled")]);

    let docs = app.get("/docs/", None).await;
    assert_eq!(docs.status, StatusCode::NOT_FOUND);

    let spec = app.get("/.well-known/openapi.json", None).await;
    assert_eq!(spec.status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::spawn();

    let response = app.get("/api/nothing-here", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
