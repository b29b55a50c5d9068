use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
};

use super::Pagination;
use crate::{
    auth::AuthUser,
    club::{
        self, Club, ClubUpdate, NewClub,
        member::{self, ClubMember, RoleChange},
    },
    error::{ErrorBody, Result},
    server::AppState,
};

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/",
    params(Pagination),
    responses((status = 200, description = "Public clubs and the caller's private clubs", body = [Club])),
    tag = "clubs"
)]
pub async fn list_clubs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Club>>> {
    let clubs = club::list_clubs(&state.database, user.id(), page.skip, page.limit).await?;
    Ok(Json(clubs))
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/my-clubs",
    responses((status = 200, description = "Clubs the caller belongs to", body = [Club])),
    tag = "clubs"
)]
pub async fn my_clubs(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Club>>> {
    Ok(Json(club::my_clubs(&state.database, user.id()).await?))
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/",
    request_body = NewClub,
    responses(
        (status = 201, description = "Club created, caller is owner", body = Club),
        (status = 409, description = "Club name already exists", body = ErrorBody),
        (status = 422, description = "Invalid input", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn create_club(
    State(state): State<AppState>,
    user: AuthUser,
    Json(new_club): Json<NewClub>,
) -> Result<(StatusCode, Json<Club>)> {
    let club = club::create_club(&state.database, state.clock.as_ref(), user.id(), new_club).await?;
    Ok((StatusCode::CREATED, Json(club)))
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 200, description = "Club", body = Club),
        (status = 403, description = "Private club", body = ErrorBody),
        (status = 404, description = "Club not found", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn get_club(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<Json<Club>> {
    Ok(Json(
        club::visible_club(&state.database, club_id, user.id()).await?,
    ))
}

#[utoipa::path(
    put,
    context_path = "/api/clubs",
    path = "/{club_id}",
    params(("club_id" = i64, Path, description = "Club id")),
    request_body = ClubUpdate,
    responses(
        (status = 200, description = "Updated club", body = Club),
        (status = 403, description = "Not an owner or admin", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn update_club(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
    Json(update): Json<ClubUpdate>,
) -> Result<Json<Club>> {
    let club = club::update_club(
        &state.database,
        state.clock.as_ref(),
        club_id,
        user.id(),
        update,
    )
    .await?;
    Ok(Json(club))
}

#[utoipa::path(
    delete,
    context_path = "/api/clubs",
    path = "/{club_id}",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 204, description = "Club deleted"),
        (status = 403, description = "Not the owner", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn delete_club(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<StatusCode> {
    club::delete_club(&state.database, club_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/{club_id}/join",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 200, description = "Membership", body = ClubMember),
        (status = 409, description = "Already a member or club full", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn join_club(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<Json<ClubMember>> {
    let membership =
        member::join_club(&state.database, state.clock.as_ref(), club_id, user.id()).await?;
    Ok(Json(membership))
}

#[utoipa::path(
    post,
    context_path = "/api/clubs",
    path = "/{club_id}/leave",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 204, description = "Left the club"),
        (status = 400, description = "Not a member, or the owner", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn leave_club(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<StatusCode> {
    member::leave_club(&state.database, club_id, user.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    context_path = "/api/clubs",
    path = "/{club_id}/members",
    params(("club_id" = i64, Path, description = "Club id")),
    responses(
        (status = 200, description = "Members, owner first", body = [ClubMember]),
        (status = 403, description = "Private club", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn list_members(
    State(state): State<AppState>,
    user: AuthUser,
    Path(club_id): Path<i64>,
) -> Result<Json<Vec<ClubMember>>> {
    Ok(Json(
        member::list_members(&state.database, club_id, user.id()).await?,
    ))
}

#[utoipa::path(
    put,
    context_path = "/api/clubs",
    path = "/{club_id}/members/{user_id}",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("user_id" = i64, Path, description = "Member's user id"),
    ),
    request_body = RoleChange,
    responses(
        (status = 200, description = "Updated membership", body = ClubMember),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Member not found", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn change_member_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, user_id)): Path<(i64, i64)>,
    Json(change): Json<RoleChange>,
) -> Result<Json<ClubMember>> {
    let membership =
        member::change_role(&state.database, club_id, user.id(), user_id, change.role).await?;
    Ok(Json(membership))
}

#[utoipa::path(
    delete,
    context_path = "/api/clubs",
    path = "/{club_id}/members/{user_id}",
    params(
        ("club_id" = i64, Path, description = "Club id"),
        ("user_id" = i64, Path, description = "Member's user id"),
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Not allowed", body = ErrorBody),
        (status = 404, description = "Member not found", body = ErrorBody),
    ),
    tag = "clubs"
)]
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((club_id, user_id)): Path<(i64, i64)>,
) -> Result<StatusCode> {
    member::remove_member(&state.database, club_id, user.id(), user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clubs", get(list_clubs).post(create_club))
        .route("/api/clubs/", get(list_clubs).post(create_club))
        .route("/api/clubs/my-clubs", get(my_clubs))
        .route(
            "/api/clubs/{club_id}",
            get(get_club).put(update_club).delete(delete_club),
        )
        .route("/api/clubs/{club_id}/join", post(join_club))
        .route("/api/clubs/{club_id}/leave", post(leave_club))
        .route("/api/clubs/{club_id}/members", get(list_members))
        .route(
            "/api/clubs/{club_id}/members/{user_id}",
            put(change_member_role).delete(remove_member),
        )
}
