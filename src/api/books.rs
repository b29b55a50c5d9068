use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::Pagination;
use crate::{
    auth::AuthUser,
    book::{self, Book, BookUpdate, NewBook},
    error::{Error, ErrorBody, Result},
    google_books::{MAX_SEARCH_RESULTS, SearchResults},
    server::AppState,
};

const MAX_QUERY_CHARS: usize = 500;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Search query, 1 to 500 characters
    pub q: String,
    /// 1 to 40, default 10
    pub max_results: Option<u32>,
    /// Index of the first result, default 0
    pub start_index: Option<u32>,
}

impl SearchQuery {
    fn validate(&self) -> Result<(u32, u32)> {
        let len = self.q.trim().chars().count();
        if len == 0 || len > MAX_QUERY_CHARS {
            return Err(Error::Validation(format!(
                "q must be between 1 and {MAX_QUERY_CHARS} characters"
            )));
        }
        let max_results = self.max_results.unwrap_or(10);
        if !(1..=MAX_SEARCH_RESULTS).contains(&max_results) {
            return Err(Error::Validation(format!(
                "max_results must be between 1 and {MAX_SEARCH_RESULTS}"
            )));
        }
        Ok((max_results, self.start_index.unwrap_or(0)))
    }
}

#[utoipa::path(
    get,
    context_path = "/api/books",
    path = "/",
    params(Pagination),
    responses((status = 200, description = "Local catalog", body = [Book])),
    tag = "books"
)]
pub async fn list_books(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<Book>>> {
    Ok(Json(
        book::list_books(&state.database, page.skip, page.limit).await?,
    ))
}

#[utoipa::path(
    get,
    context_path = "/api/books",
    path = "/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Google Books results", body = SearchResults),
        (status = 502, description = "Google Books unavailable", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn search_books(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResults>> {
    let (max_results, start_index) = query.validate()?;
    let results = state
        .google_books
        .search(query.q.trim(), max_results, start_index)
        .await?;
    Ok(Json(results))
}

#[utoipa::path(
    get,
    context_path = "/api/books",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book", body = Book),
        (status = 404, description = "Book not found", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn get_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(book_id): Path<i64>,
) -> Result<Json<Book>> {
    Ok(Json(book::get_book(&state.database, book_id).await?))
}

/// Returns the stored book instead of an error when the Google Books id is known.
#[utoipa::path(
    post,
    context_path = "/api/books",
    path = "/",
    request_body = NewBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 200, description = "Book already in the catalog", body = Book),
        (status = 422, description = "Invalid input", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn create_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(new_book): Json<NewBook>,
) -> Result<(StatusCode, Json<Book>)> {
    let (book, created) = book::create_book(&state.database, state.clock.as_ref(), new_book).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(book)))
}

#[utoipa::path(
    get,
    context_path = "/api/books",
    path = "/google/{google_books_id}",
    params(("google_books_id" = String, Path, description = "Google Books volume id")),
    responses(
        (status = 200, description = "Volume data", body = NewBook),
        (status = 404, description = "Book not found on Google Books", body = ErrorBody),
        (status = 502, description = "Google Books unavailable", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn get_google_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(google_books_id): Path<String>,
) -> Result<Json<NewBook>> {
    state
        .google_books
        .get_volume(&google_books_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::NotFound("Book not found on Google Books".into()))
}

/// Local copy of a Google Books volume, fetched and stored on first use.
#[utoipa::path(
    post,
    context_path = "/api/books",
    path = "/import/{google_books_id}",
    params(("google_books_id" = String, Path, description = "Google Books volume id")),
    responses(
        (status = 201, description = "Fetched and stored", body = Book),
        (status = 200, description = "Already stored", body = Book),
        (status = 404, description = "Book not found on Google Books", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn import_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(google_books_id): Path<String>,
) -> Result<(StatusCode, Json<Book>)> {
    let (book, created) = book::get_or_fetch_and_persist(
        &state.database,
        &state.google_books,
        state.clock.as_ref(),
        &google_books_id,
    )
    .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(book)))
}

#[utoipa::path(
    put,
    context_path = "/api/books",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    request_body = BookUpdate,
    responses(
        (status = 200, description = "Updated book", body = Book),
        (status = 404, description = "Book not found", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn update_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(book_id): Path<i64>,
    Json(update): Json<BookUpdate>,
) -> Result<Json<Book>> {
    let book = book::update_book(&state.database, state.clock.as_ref(), book_id, update).await?;
    Ok(Json(book))
}

#[utoipa::path(
    delete,
    context_path = "/api/books",
    path = "/{book_id}",
    params(("book_id" = i64, Path, description = "Book id")),
    responses(
        (status = 204, description = "Book and its dependents deleted"),
        (status = 404, description = "Book not found", body = ErrorBody),
    ),
    tag = "books"
)]
pub async fn delete_book(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(book_id): Path<i64>,
) -> Result<StatusCode> {
    book::delete_book(&state.database, book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/", get(list_books).post(create_book))
        .route("/api/books/search", get(search_books))
        .route("/api/books/google/{google_books_id}", get(get_google_book))
        .route("/api/books/import/{google_books_id}", post(import_book))
        .route(
            "/api/books/{book_id}",
            get(get_book).put(update_book).delete(delete_book),
        )
}
