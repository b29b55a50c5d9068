use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::AuthUser,
    discussion::{self, Discussion, DiscussionUpdate, NewDiscussion},
    error::{ErrorBody, Result},
    server::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DiscussionQuery {
    /// Only threads about this book
    pub book_id: Option<i64>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}/discussions",
    params(("club_id" = i64, Path, description = "Club id"), DiscussionQuery),
    responses(
        (status = 200, description = "Top-level threads, newest first", body = [Discussion]),
        (status = 403, description = "Private club", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn list_discussions(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
    Query(query): Query<DiscussionQuery>,
) -> Result<Json<Vec<Discussion>>> {
    let discussions = discussion::list_discussions(
        &state.database,
        club_id,
        user.id(),
        query.book_id,
        query.skip,
        query.limit,
    )
    .await?;
    Ok(Json(discussions))
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/{club_id}/discussions",
    params(("club_id" = i64, Path, description = "Club id")),
    request_body = NewDiscussion,
    responses(
        (status = 201, description = "Discussion or reply created", body = Discussion),
        (status = 403, description = "Not a member", body = ErrorBody),
        (status = 404, description = "Club, book or parent not found", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn create_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
    Json(new): Json<NewDiscussion>,
) -> Result<(StatusCode, Json<Discussion>)> {
    let created = discussion::create_discussion(
        &state.database,
        state.clock.as_ref(),
        club_id,
        user.id(),
        new,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    context_path = "/api/discussions",
    path = "/{discussion_id}",
    params(("discussion_id" = i64, Path, description = "Discussion id")),
    responses(
        (status = 200, description = "Discussion", body = Discussion),
        (status = 404, description = "Discussion not found", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn get_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(discussion_id): Path<i64>,
) -> Result<Json<Discussion>> {
    Ok(Json(
        discussion::get_discussion(&state.database, discussion_id, user.id()).await?,
    ))
}

#[utoipa::path(
    put,
    context_path = "/api/discussions",
    path = "/{discussion_id}",
    params(("discussion_id" = i64, Path, description = "Discussion id")),
    request_body = DiscussionUpdate,
    responses(
        (status = 200, description = "Edited discussion", body = Discussion),
        (status = 403, description = "Not the author", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn update_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(discussion_id): Path<i64>,
    Json(update): Json<DiscussionUpdate>,
) -> Result<Json<Discussion>> {
    let updated = discussion::update_discussion(
        &state.database,
        state.clock.as_ref(),
        discussion_id,
        user.id(),
        update,
    )
    .await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    context_path = "/api/discussions",
    path = "/{discussion_id}",
    params(("discussion_id" = i64, Path, description = "Discussion id")),
    responses(
        (status = 204, description = "Discussion and its replies deleted"),
        (status = 403, description = "Not the author or a club admin", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn delete_discussion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(discussion_id): Path<i64>,
) -> Result<StatusCode> {
    discussion::delete_discussion(&state.database, discussion_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    context_path = "/api/discussions",
    path = "/{discussion_id}/replies",
    params(("discussion_id" = i64, Path, description = "Discussion id")),
    responses(
        (status = 200, description = "Direct replies, oldest first", body = [Discussion]),
        (status = 404, description = "Discussion not found", body = ErrorBody),
    ),
    tag = "discussions"
)]
pub async fn list_replies(
    State(state): State<AppState>,
    user: AuthUser,
    Path(discussion_id): Path<i64>,
) -> Result<Json<Vec<Discussion>>> {
    Ok(Json(
        discussion::list_replies(&state.database, discussion_id, user.id()).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/clubs/{club_id}/discussions",
            get(list_discussions).post(create_discussion),
        )
        .route(
            "/api/discussions/{discussion_id}",
            get(get_discussion)
                .put(update_discussion)
                .delete(delete_discussion),
        )
        .route("/api/discussions/{discussion_id}/replies", get(list_replies))
}
