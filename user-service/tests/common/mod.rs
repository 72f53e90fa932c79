#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use service_core::config::Config;
use service_core::middleware::create_ip_rate_limiter;
use std::sync::Arc;
use tower::ServiceExt;
use user_service::{
    build_router,
    config::{lookup_from_pairs, UserServiceConfig},
    services::{
        AuthService, InMemoryBlacklist, InMemoryUserStore, JwtService, TokenBlacklist,
        UserService, UserStore,
    },
    AppState,
};

pub const PASSWORD: &str = "Abcdefg1!";

/// Decoded response: status plus JSON body (`Value::Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

/// Router wired to in-memory stores, driven through `oneshot`.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_env(&[])
    }

    /// Builds the app from literal config values layered over dev defaults.
    pub fn with_env(pairs: &[(&str, &str)]) -> Self {
        let mut all: Vec<(&str, &str)> = vec![
            ("RATE_LIMIT_LOGIN_ATTEMPTS", "1000"),
            ("RATE_LIMIT_REGISTER_ATTEMPTS", "1000"),
        ];
        all.extend_from_slice(pairs);

        let config = UserServiceConfig::from_lookup(Config::default(), lookup_from_pairs(&all))
            .expect("Failed to load test config");

        let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
        let blacklist: Arc<dyn TokenBlacklist> = Arc::new(InMemoryBlacklist::new());
        let jwt = JwtService::from_config(&config.jwt).expect("Failed to build JWT service");

        let state = AppState {
            login_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.login_attempts,
                config.rate_limit.login_window_seconds,
            ),
            register_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.register_attempts,
                config.rate_limit.register_window_seconds,
            ),
            auth_service: AuthService::new(users.clone(), blacklist.clone(), jwt),
            user_service: UserService::new(users.clone()),
            users,
            blacklist,
            config,
        };

        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.send(build_request(method, uri, token, body, None))
            .await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Option<Value>) -> TestResponse {
        self.request(Method::POST, uri, token, body).await
    }

    /// Registers `username` with the shared test password. Panics unless 201.
    pub async fn register(&self, username: &str) -> Value {
        let response = self
            .post(
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "register failed: {}",
            response.body
        );
        response.body
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.post(
            "/api/auth/login",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }
}

pub fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    forwarded_for: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(ip) = forwarded_for {
        builder = builder.header("x-forwarded-for", ip);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("Failed to build request"),
        None => builder.body(Body::empty()).expect("Failed to build request"),
    }
}

pub fn access_token(body: &Value) -> String {
    body["access_token"]
        .as_str()
        .expect("access_token missing")
        .to_string()
}

pub fn refresh_token(body: &Value) -> String {
    body["refresh_token"]
        .as_str()
        .expect("refresh_token missing")
        .to_string()
}

pub fn user_id(body: &Value) -> String {
    body["user"]["id"].as_str().expect("user id missing").to_string()
}
