use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::{Error, Result},
    google_books::GoogleBooksClient,
    utils::{Clock, page_window},
};

const MAX_TITLE_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i64,
    pub google_books_id: String,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    /// As reported by Google Books: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub published_date: Option<String>,
    pub page_count: Option<i64>,
    pub genres: Vec<String>,
    pub average_rating: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    google_books_id: String,
    title: String,
    author: String,
    isbn: Option<String>,
    description: Option<String>,
    cover_image: Option<String>,
    published_date: Option<String>,
    page_count: Option<i64>,
    genres: Option<String>,
    average_rating: f64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            google_books_id: row.google_books_id,
            title: row.title,
            author: row.author,
            isbn: row.isbn,
            description: row.description,
            cover_image: row.cover_image,
            published_date: row.published_date,
            page_count: row.page_count,
            genres: split_genres(row.genres.as_deref()),
            average_rating: row.average_rating,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Book data as submitted by clients or parsed from a Google Books volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    pub google_books_id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub page_count: Option<i64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub average_rating: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub published_date: Option<String>,
    pub page_count: Option<i64>,
    pub genres: Option<Vec<String>>,
    pub average_rating: Option<f64>,
}

fn split_genres(genres: Option<&str>) -> Vec<String> {
    genres
        .map(|g| {
            g.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn join_genres(genres: &[String]) -> Option<String> {
    if genres.is_empty() {
        None
    } else {
        Some(genres.join(","))
    }
}

fn validate_title(title: &str) -> Result<()> {
    let len = title.trim().chars().count();
    if len == 0 || len > MAX_TITLE_CHARS {
        return Err(Error::Validation(format!(
            "title must be between 1 and {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_fields(author: &str, page_count: Option<i64>, rating: f64) -> Result<()> {
    if author.trim().is_empty() {
        return Err(Error::Validation("author must not be empty".into()));
    }
    if page_count.is_some_and(|p| p < 0) {
        return Err(Error::Validation("pageCount must be >= 0".into()));
    }
    if !(0.0..=5.0).contains(&rating) {
        return Err(Error::Validation(
            "averageRating must be between 0 and 5".into(),
        ));
    }
    Ok(())
}

impl NewBook {
    pub fn validate(&self) -> Result<()> {
        if self.google_books_id.trim().is_empty() {
            return Err(Error::Validation("googleBooksId must not be empty".into()));
        }
        validate_title(&self.title)?;
        validate_fields(&self.author, self.page_count, self.average_rating)
    }
}

const SELECT_BOOK: &str = "SELECT id, google_books_id, title, author, isbn, description, \
    cover_image, published_date, page_count, genres, average_rating, created_at, updated_at \
    FROM books";

/// Page count of an existing book; `NotFound` when the book is absent.
pub async fn page_count<'e>(db: impl SqliteExecutor<'e>, book_id: i64) -> Result<Option<i64>> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT page_count FROM books WHERE id = ?")
        .bind(book_id)
        .fetch_optional(db)
        .await?;
    row.map(|(count,)| count)
        .ok_or_else(|| Error::not_found("Book"))
}

pub async fn get_book(database: &SqlitePool, id: i64) -> Result<Book> {
    sqlx::query_as::<_, BookRow>(&format!("{SELECT_BOOK} WHERE id = ?"))
        .bind(id)
        .fetch_optional(database)
        .await?
        .map(Book::from)
        .ok_or_else(|| Error::not_found("Book"))
}

pub async fn find_by_google_id(database: &SqlitePool, google_books_id: &str) -> Result<Option<Book>> {
    let book = sqlx::query_as::<_, BookRow>(&format!("{SELECT_BOOK} WHERE google_books_id = ?"))
        .bind(google_books_id)
        .fetch_optional(database)
        .await?;
    Ok(book.map(Book::from))
}

pub async fn list_books(
    database: &SqlitePool,
    skip: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<Book>> {
    let (skip, limit) = page_window(skip, limit);
    let books = sqlx::query_as::<_, BookRow>(&format!("{SELECT_BOOK} ORDER BY id LIMIT ? OFFSET ?"))
        .bind(limit)
        .bind(skip)
        .fetch_all(database)
        .await?;
    Ok(books.into_iter().map(Book::from).collect())
}

/// Insert unless the Google Books id is already stored. Returns the stored
/// row and whether this call created it.
pub async fn create_book(
    database: &SqlitePool,
    clock: &dyn Clock,
    new_book: NewBook,
) -> Result<(Book, bool)> {
    new_book.validate()?;
    let now = clock.now();
    let result = sqlx::query(
        "INSERT INTO books (google_books_id, title, author, isbn, description, cover_image, \
         published_date, page_count, genres, average_rating, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (google_books_id) DO NOTHING",
    )
    .bind(&new_book.google_books_id)
    .bind(new_book.title.trim())
    .bind(&new_book.author)
    .bind(&new_book.isbn)
    .bind(&new_book.description)
    .bind(&new_book.cover_image)
    .bind(&new_book.published_date)
    .bind(new_book.page_count)
    .bind(join_genres(&new_book.genres))
    .bind(new_book.average_rating)
    .bind(now)
    .bind(now)
    .execute(database)
    .await?;
    let created = result.rows_affected() == 1;
    let book = find_by_google_id(database, &new_book.google_books_id)
        .await?
        .ok_or_else(|| Error::not_found("Book"))?;
    if created {
        info!(book_id = book.id, "added book {}", book.google_books_id);
    }
    Ok((book, created))
}

/// Local hit first, otherwise one Google Books lookup and one insert.
pub async fn get_or_fetch_and_persist(
    database: &SqlitePool,
    client: &GoogleBooksClient,
    clock: &dyn Clock,
    google_books_id: &str,
) -> Result<(Book, bool)> {
    if let Some(book) = find_by_google_id(database, google_books_id).await? {
        return Ok((book, false));
    }
    let Some(new_book) = client.get_volume(google_books_id).await? else {
        return Err(Error::NotFound("Book not found on Google Books".into()));
    };
    create_book(database, clock, new_book).await
}

pub async fn update_book(
    database: &SqlitePool,
    clock: &dyn Clock,
    id: i64,
    update: BookUpdate,
) -> Result<Book> {
    let mut book = get_book(database, id).await?;
    if let Some(title) = update.title {
        validate_title(&title)?;
        book.title = title.trim().to_string();
    }
    if let Some(author) = update.author {
        book.author = author;
    }
    if update.isbn.is_some() {
        book.isbn = update.isbn;
    }
    if update.description.is_some() {
        book.description = update.description;
    }
    if update.cover_image.is_some() {
        book.cover_image = update.cover_image;
    }
    if update.published_date.is_some() {
        book.published_date = update.published_date;
    }
    if update.page_count.is_some() {
        book.page_count = update.page_count;
    }
    if let Some(genres) = update.genres {
        book.genres = genres;
    }
    if let Some(rating) = update.average_rating {
        book.average_rating = rating;
    }
    validate_fields(&book.author, book.page_count, book.average_rating)?;
    book.updated_at = clock.now();

    sqlx::query(
        "UPDATE books SET title = ?, author = ?, isbn = ?, description = ?, cover_image = ?, \
         published_date = ?, page_count = ?, genres = ?, average_rating = ?, updated_at = ? \
         WHERE id = ?",
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(&book.isbn)
    .bind(&book.description)
    .bind(&book.cover_image)
    .bind(&book.published_date)
    .bind(book.page_count)
    .bind(join_genres(&book.genres))
    .bind(book.average_rating)
    .bind(book.updated_at)
    .bind(id)
    .execute(database)
    .await?;
    info!(book_id = id, "updated book");
    Ok(book)
}

/// Delete a book with everything that points at it: reading progress,
/// reading-list entries with their votes, and discussions including replies.
pub async fn delete_book(database: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = database.begin().await?;
    page_count(&mut *tx, id).await?;
    sqlx::query(
        "DELETE FROM club_book_votes WHERE club_book_id IN \
         (SELECT id FROM club_books WHERE book_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM club_books WHERE book_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "WITH RECURSIVE doomed(id) AS ( \
             SELECT id FROM discussions WHERE book_id = ? \
             UNION SELECT d.id FROM discussions d JOIN doomed ON d.parent_id = doomed.id) \
         DELETE FROM discussions WHERE id IN (SELECT id FROM doomed)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM reading_progress WHERE book_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(book_id = id, "deleted book");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::{insert_book, insert_user, pool};
    use crate::progress;
    use crate::utils::SystemClock;

    fn new_book(google_id: &str) -> NewBook {
        NewBook {
            google_books_id: google_id.to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            isbn: None,
            description: None,
            cover_image: None,
            published_date: Some("1965".to_string()),
            page_count: Some(412),
            genres: vec!["Fiction".to_string(), "Science Fiction".to_string()],
            average_rating: 4.5,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_on_google_id() {
        let db = pool().await;
        let (first, created) = create_book(&db, &SystemClock, new_book("dune")).await.unwrap();
        assert!(created);
        assert_eq!(first.genres, vec!["Fiction", "Science Fiction"]);

        let mut again = new_book("dune");
        again.title = "Something Else".into();
        let (second, created) = create_book(&db, &SystemClock, again).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.title, "Dune");
    }

    #[tokio::test]
    async fn create_validates() {
        let db = pool().await;
        let mut bad = new_book("dune");
        bad.average_rating = 7.0;
        assert!(matches!(
            create_book(&db, &SystemClock, bad).await,
            Err(Error::Validation(_))
        ));
        let mut bad = new_book(" ");
        bad.title = "x".into();
        assert!(matches!(
            create_book(&db, &SystemClock, bad).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let db = pool().await;
        let (book, _) = create_book(&db, &SystemClock, new_book("dune")).await.unwrap();
        let update = BookUpdate {
            page_count: Some(500),
            genres: Some(vec![]),
            ..Default::default()
        };
        let updated = update_book(&db, &SystemClock, book.id, update).await.unwrap();
        assert_eq!(updated.page_count, Some(500));
        assert!(updated.genres.is_empty());
        assert_eq!(updated.author, "Frank Herbert");
        assert_eq!(get_book(&db, book.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn delete_removes_dependents() {
        let db = pool().await;
        let user = insert_user(&db, "reader@example.com").await;
        let book = insert_book(&db, "vol-1", Some(100)).await;
        progress::add_to_catalog(&db, &SystemClock, user, book, None)
            .await
            .unwrap();
        delete_book(&db, book).await.unwrap();
        assert!(matches!(get_book(&db, book).await, Err(Error::NotFound(_))));
        assert!(progress::list_progress(&db, user, None).await.unwrap().is_empty());
        assert!(matches!(delete_book(&db, book).await, Err(Error::NotFound(_))));
    }

    #[test]
    fn genres_split_and_join() {
        assert_eq!(split_genres(Some("a, b,,c")), vec!["a", "b", "c"]);
        assert!(split_genres(None).is_empty());
        assert_eq!(join_genres(&["a".into(), "b".into()]).as_deref(), Some("a,b"));
        assert_eq!(join_genres(&[]), None);
    }
}
