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
    error::{ErrorBody, Result},
    progress::{self, ProgressUpdate, ReadingProgress, ReadingStatus},
    server::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusFilter {
    pub status: Option<ReadingStatus>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CatalogQuery {
    /// Club reading challenge to attach the progress to
    pub club_id: Option<i64>,
}

#[utoipa::path(
    get,
    context_path = "/api/progress",
    path = "/",
    params(StatusFilter),
    responses((status = 200, description = "The caller's catalog, newest first", body = [ReadingProgress])),
    tag = "progress"
)]
pub async fn list_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Query(filter): Query<StatusFilter>,
) -> Result<Json<Vec<ReadingProgress>>> {
    Ok(Json(
        progress::list_progress(&state.database, user.id(), filter.status).await?,
    ))
}

#[utoipa::path(
    post,
    context_path = "/api/progress",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id"), CatalogQuery),
    responses(
        (status = 201, description = "Added to the catalog", body = ReadingProgress),
        (status = 200, description = "Already in the catalog", body = ReadingProgress),
        (status = 404, description = "Book or club not found", body = ErrorBody),
    ),
    tag = "progress"
)]
pub async fn add_to_catalog(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<i64>,
    Query(query): Query<CatalogQuery>,
) -> Result<(StatusCode, Json<ReadingProgress>)> {
    let (row, created) = progress::add_to_catalog(
        &state.database,
        state.clock.as_ref(),
        user.id(),
        book_id,
        query.club_id,
    )
    .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(row)))
}

#[utoipa::path(
    get,
    context_path = "/api/progress",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Reading progress", body = ReadingProgress),
        (status = 404, description = "Book or progress not found", body = ErrorBody),
    ),
    tag = "progress"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<i64>,
) -> Result<Json<ReadingProgress>> {
    Ok(Json(
        progress::get_progress(&state.database, user.id(), book_id).await?,
    ))
}

#[utoipa::path(
    put,
    context_path = "/api/progress",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    request_body = ProgressUpdate,
    responses(
        (status = 200, description = "Updated progress", body = ReadingProgress),
        (status = 404, description = "Book or progress not found", body = ErrorBody),
        (status = 422, description = "Field out of range", body = ErrorBody),
    ),
    tag = "progress"
)]
pub async fn update_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<i64>,
    Json(update): Json<ProgressUpdate>,
) -> Result<Json<ReadingProgress>> {
    let updated = progress::update_progress(
        &state.database,
        state.clock.as_ref(),
        user.id(),
        book_id,
        update,
        state.config.reject_conflicting_progress_updates,
    )
    .await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    context_path = "/api/progress",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    responses(
        (status = 204, description = "Progress removed, book kept"),
        (status = 404, description = "Book or progress not found", body = ErrorBody),
    ),
    tag = "progress"
)]
pub async fn delete_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path(book_id): Path<i64>,
) -> Result<StatusCode> {
    progress::delete_progress(&state.database, user.id(), book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/progress", get(list_progress))
        .route("/api/progress/", get(list_progress))
        .route(
            "/api/progress/{book_id}",
            get(get_progress)
                .post(add_to_catalog)
                .put(update_progress)
                .delete(delete_progress),
        )
}
