use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::Message;
use crate::{
    auth::{AuthUser, Token, TokenType},
    error::{Error, ErrorBody, Result},
    server::AppState,
    user::{self, RegisterRequest, UserInfo},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[utoipa::path(
    post,
    context_path = "/api/auth",
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserInfo),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserInfo>)> {
    let user = user::register(&state.database, state.clock.as_ref(), request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    context_path = "/api/auth",
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = Token),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Inactive user", body = ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Token>> {
    let user = user::authenticate(&state.database, &request.email, &request.password).await?;
    let token = state.tokens.issue(user.id, &user.email, state.clock.now())?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(token))
}

#[utoipa::path(
    post,
    context_path = "/api/auth",
    path = "/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair", body = Token),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorBody),
    ),
    security(()),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<Token>> {
    let claims = state
        .tokens
        .verify(&request.refresh_token, TokenType::Refresh)?;
    let user = user::get_user(&state.database, claims.sub)
        .await
        .map_err(|e| match e {
            Error::NotFound(_) => Error::Unauthorized("Could not validate credentials".into()),
            other => other,
        })?;
    if !user.is_active {
        return Err(Error::Forbidden("Inactive user".into()));
    }
    Ok(Json(state.tokens.issue(user.id, &user.email, state.clock.now())?))
}

#[utoipa::path(
    get,
    context_path = "/api/auth",
    path = "/me",
    responses(
        (status = 200, description = "Current user", body = UserInfo),
        (status = 401, description = "Not authenticated", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn me(AuthUser(user): AuthUser) -> Json<UserInfo> {
    Json(user)
}

/// Tokens are stateless; clients drop them.
#[utoipa::path(
    post,
    context_path = "/api/auth",
    path = "/logout",
    responses((status = 200, description = "Logged out", body = Message)),
    tag = "auth"
)]
pub async fn logout(user: AuthUser) -> Json<Message> {
    info!(user_id = user.id(), "user logged out");
    Message::new("Successfully logged out")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
}
