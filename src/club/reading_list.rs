use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use super::{require_admin, require_member, visible_club};
use crate::{
    book,
    error::{Error, Result, conflict_on_unique},
    utils::Clock,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ClubBookStatus {
    Voted,
    Planned,
    Current,
    Completed,
}

/// A book on a club's reading list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubBook {
    pub id: i64,
    pub club_id: i64,
    pub book_id: i64,
    pub status: ClubBookStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
    pub vote_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NominateRequest {
    pub book_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubBookUpdate {
    pub status: ClubBookStatus,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub completed_at: Option<OffsetDateTime>,
}

const SELECT_CLUB_BOOK: &str = "SELECT cb.id, cb.club_id, cb.book_id, cb.status, cb.added_at, \
    cb.started_at, cb.completed_at, \
    (SELECT COUNT(*) FROM club_book_votes v WHERE v.club_book_id = cb.id) AS vote_count \
    FROM club_books cb";

fn not_on_list() -> Error {
    Error::NotFound("Book not found in club reading list".into())
}

async fn find(database: &SqlitePool, club_id: i64, book_id: i64) -> Result<ClubBook> {
    sqlx::query_as::<_, ClubBook>(&format!(
        "{SELECT_CLUB_BOOK} WHERE cb.club_id = ? AND cb.book_id = ?"
    ))
    .bind(club_id)
    .bind(book_id)
    .fetch_optional(database)
    .await?
    .ok_or_else(not_on_list)
}

pub async fn list_club_books(
    database: &SqlitePool,
    club_id: i64,
    viewer_id: i64,
    status: Option<ClubBookStatus>,
) -> Result<Vec<ClubBook>> {
    visible_club(database, club_id, viewer_id).await?;
    let books = match status {
        Some(status) => {
            sqlx::query_as::<_, ClubBook>(&format!(
                "{SELECT_CLUB_BOOK} WHERE cb.club_id = ? AND cb.status = ? \
                 ORDER BY cb.added_at DESC, cb.id DESC"
            ))
            .bind(club_id)
            .bind(status)
            .fetch_all(database)
            .await?
        }
        None => {
            sqlx::query_as::<_, ClubBook>(&format!(
                "{SELECT_CLUB_BOOK} WHERE cb.club_id = ? ORDER BY cb.added_at DESC, cb.id DESC"
            ))
            .bind(club_id)
            .fetch_all(database)
            .await?
        }
    };
    Ok(books)
}

/// Members put a book up for a vote.
pub async fn nominate(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
    book_id: i64,
) -> Result<ClubBook> {
    require_member(database, club_id, user_id, "nominate books").await?;
    book::page_count(database, book_id).await?;
    sqlx::query("INSERT INTO club_books (club_id, book_id, status, added_at) VALUES (?, ?, ?, ?)")
        .bind(club_id)
        .bind(book_id)
        .bind(ClubBookStatus::Voted)
        .bind(clock.now())
        .execute(database)
        .await
        .map_err(conflict_on_unique(
            "Book already nominated or in club reading list",
        ))?;
    info!(user_id, club_id, book_id, "nominated book");
    find(database, club_id, book_id).await
}

/// Entering `current` stamps `startedAt`, entering `completed` stamps
/// `completedAt`; explicit timestamps in the request win.
pub async fn update_status(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
    book_id: i64,
    update: ClubBookUpdate,
) -> Result<ClubBook> {
    require_admin(database, club_id, user_id, "update club books").await?;
    let mut club_book = find(database, club_id, book_id).await?;
    let old_status = club_book.status;
    club_book.status = update.status;
    if update.status == ClubBookStatus::Current && old_status != ClubBookStatus::Current {
        club_book.started_at = Some(clock.now());
    } else if update.status == ClubBookStatus::Completed
        && old_status != ClubBookStatus::Completed
    {
        club_book.completed_at = Some(clock.now());
    }
    if update.started_at.is_some() {
        club_book.started_at = update.started_at;
    }
    if update.completed_at.is_some() {
        club_book.completed_at = update.completed_at;
    }
    sqlx::query("UPDATE club_books SET status = ?, started_at = ?, completed_at = ? WHERE id = ?")
        .bind(club_book.status)
        .bind(club_book.started_at)
        .bind(club_book.completed_at)
        .bind(club_book.id)
        .execute(database)
        .await?;
    info!(
        user_id,
        club_id,
        book_id,
        status = ?club_book.status,
        "updated club book"
    );
    Ok(club_book)
}

pub async fn remove(database: &SqlitePool, club_id: i64, user_id: i64, book_id: i64) -> Result<()> {
    require_admin(database, club_id, user_id, "remove club books").await?;
    let club_book = find(database, club_id, book_id).await?;
    let mut tx = database.begin().await?;
    sqlx::query("DELETE FROM club_book_votes WHERE club_book_id = ?")
        .bind(club_book.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM club_books WHERE id = ?")
        .bind(club_book.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(user_id, club_id, book_id, "removed club book");
    Ok(())
}

/// The book the club is reading now; the most recently started one wins.
pub async fn current_book(database: &SqlitePool, club_id: i64, viewer_id: i64) -> Result<ClubBook> {
    visible_club(database, club_id, viewer_id).await?;
    sqlx::query_as::<_, ClubBook>(&format!(
        "{SELECT_CLUB_BOOK} WHERE cb.club_id = ? AND cb.status = ? \
         ORDER BY cb.started_at DESC, cb.id DESC LIMIT 1"
    ))
    .bind(club_id)
    .bind(ClubBookStatus::Current)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| Error::NotFound("Club has no current book".into()))
}

/// One vote per member on a book still up for a vote.
pub async fn vote(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
    book_id: i64,
) -> Result<ClubBook> {
    require_member(database, club_id, user_id, "vote on books").await?;
    let club_book = find(database, club_id, book_id).await?;
    if club_book.status != ClubBookStatus::Voted {
        return Err(Error::BadRequest(
            "Voting is closed for this book".into(),
        ));
    }
    sqlx::query("INSERT INTO club_book_votes (club_book_id, user_id, voted_at) VALUES (?, ?, ?)")
        .bind(club_book.id)
        .bind(user_id)
        .bind(clock.now())
        .execute(database)
        .await
        .map_err(conflict_on_unique("You have already voted for this book"))?;
    info!(user_id, club_id, book_id, "voted");
    find(database, club_id, book_id).await
}

pub async fn unvote(
    database: &SqlitePool,
    club_id: i64,
    user_id: i64,
    book_id: i64,
) -> Result<ClubBook> {
    require_member(database, club_id, user_id, "vote on books").await?;
    let club_book = find(database, club_id, book_id).await?;
    let result = sqlx::query("DELETE FROM club_book_votes WHERE club_book_id = ? AND user_id = ?")
        .bind(club_book.id)
        .bind(user_id)
        .execute(database)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("Vote"));
    }
    info!(user_id, club_id, book_id, "withdrew vote");
    find(database, club_id, book_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::{create_club, member::join_club, tests::new_club};
    use crate::database::test_support::{insert_book, insert_user, pool};
    use crate::utils::FixedClock;
    use time::macros::datetime;

    const CLOCK: FixedClock = FixedClock(datetime!(2025-03-01 09:30 UTC));

    #[tokio::test]
    async fn nominate_vote_and_promote() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let outsider = insert_user(&db, "eve@example.com").await;
        let book = insert_book(&db, "vol-1", Some(200)).await;
        let club = create_club(&db, &CLOCK, alice, new_club("Open", false))
            .await
            .unwrap();
        join_club(&db, &CLOCK, club.id, bob).await.unwrap();

        assert!(matches!(
            nominate(&db, &CLOCK, club.id, outsider, book).await,
            Err(Error::Forbidden(_))
        ));
        let nominated = nominate(&db, &CLOCK, club.id, bob, book).await.unwrap();
        assert_eq!(nominated.status, ClubBookStatus::Voted);
        assert!(matches!(
            nominate(&db, &CLOCK, club.id, alice, book).await,
            Err(Error::Conflict(_))
        ));

        vote(&db, &CLOCK, club.id, alice, book).await.unwrap();
        let voted = vote(&db, &CLOCK, club.id, bob, book).await.unwrap();
        assert_eq!(voted.vote_count, 2);
        assert!(matches!(
            vote(&db, &CLOCK, club.id, bob, book).await,
            Err(Error::Conflict(_))
        ));
        let after = unvote(&db, club.id, bob, book).await.unwrap();
        assert_eq!(after.vote_count, 1);

        assert!(matches!(
            update_status(
                &db,
                &CLOCK,
                club.id,
                bob,
                book,
                ClubBookUpdate {
                    status: ClubBookStatus::Current,
                    started_at: None,
                    completed_at: None,
                }
            )
            .await,
            Err(Error::Forbidden(_))
        ));
        let current = update_status(
            &db,
            &CLOCK,
            club.id,
            alice,
            book,
            ClubBookUpdate {
                status: ClubBookStatus::Current,
                started_at: None,
                completed_at: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(current.started_at, Some(CLOCK.0));
        assert_eq!(current_book(&db, club.id, bob).await.unwrap().id, current.id);
        assert!(matches!(
            vote(&db, &CLOCK, club.id, bob, book).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn explicit_timestamps_override_and_remove_clears_votes() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let book = insert_book(&db, "vol-1", None).await;
        let club = create_club(&db, &CLOCK, alice, new_club("Open", false))
            .await
            .unwrap();
        assert!(matches!(
            current_book(&db, club.id, alice).await,
            Err(Error::NotFound(_))
        ));
        nominate(&db, &CLOCK, club.id, alice, book).await.unwrap();
        vote(&db, &CLOCK, club.id, alice, book).await.unwrap();

        let finished = datetime!(2025-02-01 00:00 UTC);
        let done = update_status(
            &db,
            &CLOCK,
            club.id,
            alice,
            book,
            ClubBookUpdate {
                status: ClubBookStatus::Completed,
                started_at: None,
                completed_at: Some(finished),
            },
        )
        .await
        .unwrap();
        assert_eq!(done.completed_at, Some(finished));
        assert_eq!(done.started_at, None);

        remove(&db, club.id, alice, book).await.unwrap();
        assert!(list_club_books(&db, club.id, alice, None).await.unwrap().is_empty());
        assert!(matches!(
            remove(&db, club.id, alice, book).await,
            Err(Error::NotFound(_))
        ));
    }
}
