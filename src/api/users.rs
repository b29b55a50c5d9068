use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
};

use super::Pagination;
use crate::{
    auth::AuthUser,
    error::{ErrorBody, Result},
    server::AppState,
    user::{self, UserInfo, UserUpdate},
};

#[utoipa::path(
    get,
    context_path = "/api/users",
    path = "/",
    params(Pagination),
    responses((status = 200, description = "Active users", body = [UserInfo])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<UserInfo>>> {
    let users = user::list_users(&state.database, page.skip, page.limit).await?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    context_path = "/api/users",
    path = "/{user_id}",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserInfo),
        (status = 404, description = "User not found", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<UserInfo>> {
    Ok(Json(user::get_active_user(&state.database, user_id).await?))
}

#[utoipa::path(
    put,
    context_path = "/api/users",
    path = "/me",
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserInfo),
        (status = 422, description = "Invalid input", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserInfo>> {
    let updated = user::update_user(&state.database, state.clock.as_ref(), user.id(), update).await?;
    Ok(Json(updated))
}

/// Soft delete of the caller's own account.
#[utoipa::path(
    delete,
    context_path = "/api/users",
    path = "/me",
    responses((status = 204, description = "Account deactivated")),
    tag = "users"
)]
pub async fn delete_me(State(state): State<AppState>, user: AuthUser) -> Result<StatusCode> {
    user::deactivate_user(&state.database, state.clock.as_ref(), user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/", get(list_users))
        .route("/api/users/me", put(update_me).delete(delete_me))
        .route("/api/users/{user_id}", get(get_user))
}
