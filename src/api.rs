pub mod auth;
pub mod books;
pub mod club_books;
pub mod clubs;
pub mod discussions;
pub mod progress;
pub mod users;

use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use utoipa::{
    IntoParams, Modify, OpenApi, ToSchema,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::server::AppState;

/// `skip`/`limit` query parameters shared by list endpoints.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Number of records to skip
    pub skip: Option<i64>,
    /// Maximum number of records to return, 1 to 100
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Book Club API", description = "Reading progress, clubs, reading lists and discussions"),
    modifiers(&SecurityAddon),
    security(("bearer_auth" = [])),
    paths(
        auth::register,
        auth::login,
        auth::refresh,
        auth::me,
        auth::logout,
        users::list_users,
        users::get_user,
        users::update_me,
        users::delete_me,
        books::list_books,
        books::search_books,
        books::get_book,
        books::create_book,
        books::get_google_book,
        books::import_book,
        books::update_book,
        books::delete_book,
        progress::list_progress,
        progress::add_to_catalog,
        progress::get_progress,
        progress::update_progress,
        progress::delete_progress,
        clubs::list_clubs,
        clubs::my_clubs,
        clubs::create_club,
        clubs::get_club,
        clubs::update_club,
        clubs::delete_club,
        clubs::join_club,
        clubs::leave_club,
        clubs::list_members,
        clubs::change_member_role,
        clubs::remove_member,
        club_books::list_club_books,
        club_books::nominate_book,
        club_books::current_book,
        club_books::update_club_book,
        club_books::remove_club_book,
        club_books::vote,
        club_books::unvote,
        club_books::club_book_progress,
        discussions::list_discussions,
        discussions::create_discussion,
        discussions::get_discussion,
        discussions::update_discussion,
        discussions::delete_discussion,
        discussions::list_replies,
    ),
    components(schemas(crate::error::ErrorBody, Message)),
    tags(
        (name = "auth", description = "Registration, login and tokens"),
        (name = "users"),
        (name = "books", description = "Local catalog and Google Books lookups"),
        (name = "progress", description = "Per-user reading progress"),
        (name = "clubs"),
        (name = "club_books", description = "Club reading lists and votes"),
        (name = "discussions"),
    )
)]
pub struct ApiDoc;

/// OpenAPI document as pretty JSON, the form `export_openapi_json` writes.
pub fn openapi_json() -> anyhow::Result<String> {
    Ok(ApiDoc::openapi().to_pretty_json()?)
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Every `/api/*` route plus the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(books::router())
        .merge(progress::router())
        .merge(clubs::router())
        .merge(club_books::router())
        .merge(discussions::router())
        .route("/api-docs/openapi.json", get(openapi))
}
