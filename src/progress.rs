pub mod tracker;

use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    book, club,
    error::{Error, Result},
    utils::Clock,
};
use tracker::ReadingProgressTracker;

pub const MAX_REVIEW_CHARS: usize = 2000;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReadingStatus {
    NotStarted,
    Reading,
    Completed,
    Abandoned,
}

/// A user's reading state for one book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    /// Club reading challenge this progress belongs to, if any
    pub club_id: Option<i64>,
    pub status: ReadingStatus,
    pub current_page: i64,
    pub progress_percentage: f64,
    pub rating: Option<i64>,
    pub review: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReadingProgress {
    /// The row a user gets when a book first lands in their catalog.
    pub fn new_default(
        user_id: i64,
        book_id: i64,
        club_id: Option<i64>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            book_id,
            club_id,
            status: ReadingStatus::NotStarted,
            current_page: 0,
            progress_percentage: 0.0,
            rating: None,
            review: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update; every field is optional and applied independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: Option<ReadingStatus>,
    pub current_page: Option<i64>,
    pub progress_percentage: Option<f64>,
    pub rating: Option<i64>,
    pub review: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
}

impl ProgressUpdate {
    pub fn validate(&self, reject_conflicting: bool) -> Result<()> {
        if let Some(page) = self.current_page
            && page < 0
        {
            return Err(Error::Validation("currentPage must be >= 0".into()));
        }
        if let Some(percentage) = self.progress_percentage
            && !(0.0..=100.0).contains(&percentage)
        {
            return Err(Error::Validation(
                "progressPercentage must be between 0 and 100".into(),
            ));
        }
        if let Some(rating) = self.rating
            && !(1..=5).contains(&rating)
        {
            return Err(Error::Validation("rating must be between 1 and 5".into()));
        }
        if let Some(review) = &self.review
            && review.chars().count() > MAX_REVIEW_CHARS
        {
            return Err(Error::Validation(format!(
                "review must be at most {MAX_REVIEW_CHARS} characters"
            )));
        }
        if reject_conflicting
            && self.status.is_some()
            && (self.current_page.is_some() || self.progress_percentage.is_some())
        {
            return Err(Error::Validation(
                "status cannot be combined with currentPage or progressPercentage".into(),
            ));
        }
        Ok(())
    }
}

const SELECT_PROGRESS: &str = "SELECT id, user_id, book_id, club_id, status, current_page, \
    progress_percentage, rating, review, started_at, completed_at, created_at, updated_at \
    FROM reading_progress";

async fn find<'e>(
    db: impl SqliteExecutor<'e>,
    user_id: i64,
    book_id: i64,
) -> Result<Option<ReadingProgress>> {
    let progress = sqlx::query_as::<_, ReadingProgress>(&format!(
        "{SELECT_PROGRESS} WHERE user_id = ? AND book_id = ?"
    ))
    .bind(user_id)
    .bind(book_id)
    .fetch_optional(db)
    .await?;
    Ok(progress)
}

fn progress_not_found() -> Error {
    Error::NotFound("Reading progress not found for this book".into())
}

pub async fn get_progress(
    database: &SqlitePool,
    user_id: i64,
    book_id: i64,
) -> Result<ReadingProgress> {
    book::page_count(database, book_id).await?;
    find(database, user_id, book_id)
        .await?
        .ok_or_else(progress_not_found)
}

pub async fn list_progress(
    database: &SqlitePool,
    user_id: i64,
    status: Option<ReadingStatus>,
) -> Result<Vec<ReadingProgress>> {
    let list = match status {
        Some(status) => {
            sqlx::query_as::<_, ReadingProgress>(&format!(
                "{SELECT_PROGRESS} WHERE user_id = ? AND status = ? ORDER BY updated_at DESC, id DESC"
            ))
            .bind(user_id)
            .bind(status)
            .fetch_all(database)
            .await?
        }
        None => {
            sqlx::query_as::<_, ReadingProgress>(&format!(
                "{SELECT_PROGRESS} WHERE user_id = ? ORDER BY updated_at DESC, id DESC"
            ))
            .bind(user_id)
            .fetch_all(database)
            .await?
        }
    };
    Ok(list)
}

/// Put a book in the user's catalog. Returns the row and whether it was created.
pub async fn add_to_catalog(
    database: &SqlitePool,
    clock: &dyn Clock,
    user_id: i64,
    book_id: i64,
    club_id: Option<i64>,
) -> Result<(ReadingProgress, bool)> {
    book::page_count(database, book_id).await?;
    if let Some(club_id) = club_id {
        club::get_club(database, club_id).await?;
        if club::member_role(database, club_id, user_id).await?.is_none() {
            return Err(Error::Forbidden(
                "You must be a member of the club to track progress for it".into(),
            ));
        }
    }
    let row = ReadingProgress::new_default(user_id, book_id, club_id, clock.now());
    let result = sqlx::query(
        "INSERT INTO reading_progress (user_id, book_id, club_id, status, current_page, \
         progress_percentage, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, book_id) DO NOTHING",
    )
    .bind(row.user_id)
    .bind(row.book_id)
    .bind(row.club_id)
    .bind(row.status)
    .bind(row.current_page)
    .bind(row.progress_percentage)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(database)
    .await?;
    let created = result.rows_affected() == 1;
    if created {
        info!(user_id, book_id, "book added to catalog");
    }
    let progress = find(database, user_id, book_id)
        .await?
        .ok_or_else(progress_not_found)?;
    Ok((progress, created))
}

/// Read the row, run the tracker, write it back, all in one transaction.
pub async fn update_progress(
    database: &SqlitePool,
    clock: &dyn Clock,
    user_id: i64,
    book_id: i64,
    update: ProgressUpdate,
    reject_conflicting: bool,
) -> Result<ReadingProgress> {
    update.validate(reject_conflicting)?;
    let mut tx = database.begin().await?;
    let page_count = book::page_count(&mut *tx, book_id).await?;
    let mut progress = find(&mut *tx, user_id, book_id)
        .await?
        .ok_or_else(progress_not_found)?;

    ReadingProgressTracker::new(page_count, clock.now()).apply(&mut progress, update);

    sqlx::query(
        "UPDATE reading_progress SET status = ?, current_page = ?, progress_percentage = ?, \
         rating = ?, review = ?, started_at = ?, completed_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(progress.status)
    .bind(progress.current_page)
    .bind(progress.progress_percentage)
    .bind(progress.rating)
    .bind(&progress.review)
    .bind(progress.started_at)
    .bind(progress.completed_at)
    .bind(progress.updated_at)
    .bind(progress.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        user_id,
        book_id,
        status = ?progress.status,
        percentage = progress.progress_percentage,
        "updated reading progress"
    );
    Ok(progress)
}

/// Remove the progress row only; the book stays in the catalog.
pub async fn delete_progress(database: &SqlitePool, user_id: i64, book_id: i64) -> Result<()> {
    book::page_count(database, book_id).await?;
    let result = sqlx::query("DELETE FROM reading_progress WHERE user_id = ? AND book_id = ?")
        .bind(user_id)
        .bind(book_id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        return Err(progress_not_found());
    }
    info!(user_id, book_id, "deleted reading progress");
    Ok(())
}

/// Club-wide view: every member's progress on one book.
pub async fn club_book_progress(
    database: &SqlitePool,
    club_id: i64,
    book_id: i64,
) -> Result<Vec<ReadingProgress>> {
    let list = sqlx::query_as::<_, ReadingProgress>(&format!(
        "{SELECT_PROGRESS} WHERE book_id = ? AND user_id IN \
         (SELECT user_id FROM club_members WHERE club_id = ?) \
         ORDER BY progress_percentage DESC, id ASC"
    ))
    .bind(book_id)
    .bind(club_id)
    .fetch_all(database)
    .await?;
    Ok(list)
}
