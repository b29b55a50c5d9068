use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::AuthUser,
    club::{
        self,
        reading_list::{self, ClubBook, ClubBookStatus, ClubBookUpdate, NominateRequest},
    },
    error::{ErrorBody, Result},
    progress::{self, ReadingProgress},
    server::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClubBookFilter {
    pub status: Option<ClubBookStatus>,
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}/books",
    params(("club_id" = i64, Path, description = "Club id"), ClubBookFilter),
    responses(
        (status = 200, description = "Reading list, newest first", body = [ClubBook]),
        (status = 403, description = "Private club", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn list_club_books(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
    Query(filter): Query<ClubBookFilter>,
) -> Result<Json<Vec<ClubBook>>> {
    let books =
        reading_list::list_club_books(&state.database, club_id, user.id(), filter.status).await?;
    Ok(Json(books))
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/{club_id}/books/nominate",
    params(("club_id" = i64, Path, description = "Club id")),
    request_body = NominateRequest,
    responses(
        (status = 201, description = "Book nominated", body = ClubBook),
        (status = 403, description = "Not a member", body = ErrorBody),
        (status = 409, description = "Already on the list", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn nominate_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
    Json(request): Json<NominateRequest>,
) -> Result<(StatusCode, Json<ClubBook>)> {
    let club_book = reading_list::nominate(
        &state.database,
        state.clock.as_ref(),
        club_id,
        user.id(),
        request.book_id,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(club_book)))
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}/books/current",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 200, description = "Book being read now", body = ClubBook),
        (status = 404, description = "Club has no current book", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn current_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<Json<ClubBook>> {
    Ok(Json(
        reading_list::current_book(&state.database, club_id, user.id()).await?,
    ))
}

#[utoipa::path(
    put,
    context_path = "/api/clubs",
    path = "/{club_id}/books/{book_id}",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("book_id" = i64, Path, description = "Book id"),
    ),
    request_body = ClubBookUpdate,
    responses(
        (status = 200, description = "Updated entry", body = ClubBook),
        (status = 403, description = "Not an owner or admin", body = ErrorBody),
        (status = 404, description = "Book not found in club reading list", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn update_club_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, book_id)): Path<(i64, i64)>,
    Json(update): Json<ClubBookUpdate>,
) -> Result<Json<ClubBook>> {
    let club_book = reading_list::update_status(
        &state.database,
        state.clock.as_ref(),
        club_id,
        user.id(),
        book_id,
        update,
    )
    .await?;
    Ok(Json(club_book))
}

#[utoipa::path(
    delete,
    context_path = "/api/clubs",
    path = "/{club_id}/books/{book_id}",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("book_id" = i64, Path, description = "Book id"),
    ),
    responses(
        (status = 204, description = "Removed from the reading list"),
        (status = 403, description = "Not an owner or admin", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn remove_club_book(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, book_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    reading_list::remove(&state.database, club_id, user.id(), book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/{club_id}/books/{book_id}/vote",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("book_id" = i64, Path, description = "Book id"),
    ),
    responses(
        (status = 200, description = "Entry with the new vote count", body = ClubBook),
        (status = 400, description = "Voting closed", body = ErrorBody),
        (status = 409, description = "Already voted", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn vote(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, book_id)): Path<(i64, i64)>,
) -> Result<Json<ClubBook>> {
    let club_book = reading_list::vote(
        &state.database,
        state.clock.as_ref(),
        club_id,
        user.id(),
        book_id,
    )
    .await?;
    Ok(Json(club_book))
}

#[utoipa::path(
    delete,
    context_path = "/api/clubs",
    path = "/{club_id}/books/{book_id}/vote",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("book_id" = i64, Path, description = "Book id"),
    ),
    responses(
        (status = 200, description = "Entry with the new vote count", body = ClubBook),
        (status = 404, description = "Vote not found", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn unvote(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, book_id)): Path<(i64, i64)>,
) -> Result<Json<ClubBook>> {
    Ok(Json(
        reading_list::unvote(&state.database, club_id, user.id(), book_id).await?,
    ))
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}/books/{book_id}/progress",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("book_id" = i64, Path, description = "Book id"),
    ),
    responses(
        (status = 200, description = "Members' progress on the book, furthest first", body = [ReadingProgress]),
        (status = 403, description = "Private club", body = ErrorBody),
    ),
    tag = "club_books"
)]
pub async fn club_book_progress(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, book_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<ReadingProgress>>> {
    club::visible_club(&state.database, club_id, user.id()).await?;
    Ok(Json(
        progress::club_book_progress(&state.database, club_id, book_id).await?,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clubs/{club_id}/books", get(list_club_books))
        .route("/api/clubs/{club_id}/books/nominate", post(nominate_book))
        .route("/api/clubs/{club_id}/books/current", get(current_book))
        .route(
            "/api/clubs/{club_id}/books/{book_id}",
            put(update_club_book).delete(remove_club_book),
        )
        .route(
            "/api/clubs/{club_id}/books/{book_id}/vote",
            post(vote).delete(unvote),
        )
        .route(
            "/api/clubs/{club_id}/books/{book_id}/progress",
            get(club_book_progress),
        )
}
