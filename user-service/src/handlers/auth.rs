use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{AuthResponse, LoginRequest, LogoutRequest, MeResponse, RegisterRequest},
        MessageResponse,
    },
    middleware::BearerToken,
    models::User,
    utils::ValidatedJson,
    AppState,
};

/// Register a new account and receive a credential pair
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Username or email already in use", body = ErrorResponse),
        (status = 429, description = "Too many registration attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, tokens) = state.auth_service.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            user: user.to_response(true),
            tokens,
        }),
    ))
}

/// Login with username (or email) and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 429, description = "Too many login attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, tokens) = state.auth_service.login(req).await?;
    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user: user.to_response(true),
        tokens,
    }))
}

/// Exchange the refresh token in the Authorization header for a new pair
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    responses(
        (status = 200, description = "Token refreshed", body = CredentialPair),
        (status = 401, description = "Invalid, expired or reused refresh token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.auth_service.refresh(&token).await?;
    Ok(Json(tokens))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated user", body = MeResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me(Extension(user): Extension<User>) -> impl IntoResponse {
    Json(MeResponse {
        user: user.to_response(true),
    })
}

/// Logout: revoke the access token and optionally a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    request_body(content = LogoutRequest, description = "Optional refresh token to revoke as well"),
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    state
        .auth_service
        .logout(&token, req.refresh_token.as_deref())
        .await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}
