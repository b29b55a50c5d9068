pub mod member;
pub mod reading_list;

use serde::{Deserialize, Serialize};
use sqlx::{SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    error::{Error, Result, conflict_on_unique},
    utils::{Clock, page_window},
};

pub const DEFAULT_MAX_MEMBERS: i64 = 50;
const MAX_NAME_CHARS: usize = 200;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

impl MemberRole {
    pub fn is_admin(self) -> bool {
        matches!(self, MemberRole::Owner | MemberRole::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub is_private: bool,
    pub created_by_id: i64,
    pub max_members: i64,
    pub member_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn default_max_members() -> i64 {
    DEFAULT_MAX_MEMBERS
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewClub {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "default_max_members")]
    pub max_members: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub is_private: Option<bool>,
    pub max_members: Option<i64>,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.trim().chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(Error::Validation(format!(
            "name must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(Error::Validation("description must not be empty".into()));
    }
    Ok(())
}

fn validate_max_members(max_members: i64) -> Result<()> {
    if !(2..=1000).contains(&max_members) {
        return Err(Error::Validation(
            "maxMembers must be between 2 and 1000".into(),
        ));
    }
    Ok(())
}

const SELECT_CLUB: &str = "SELECT c.id, c.name, c.description, c.cover_image, c.is_private, \
    c.created_by_id, c.max_members, \
    (SELECT COUNT(*) FROM club_members m WHERE m.club_id = c.id) AS member_count, \
    c.created_at, c.updated_at FROM clubs c";

pub async fn get_club<'e>(db: impl SqliteExecutor<'e>, club_id: i64) -> Result<Club> {
    sqlx::query_as::<_, Club>(&format!("{SELECT_CLUB} WHERE c.id = ?"))
        .bind(club_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::not_found("Club"))
}

pub async fn member_role<'e>(
    db: impl SqliteExecutor<'e>,
    club_id: i64,
    user_id: i64,
) -> Result<Option<MemberRole>> {
    let role: Option<(MemberRole,)> =
        sqlx::query_as("SELECT role FROM club_members WHERE club_id = ? AND user_id = ?")
            .bind(club_id)
            .bind(user_id)
            .fetch_optional(db)
            .await?;
    Ok(role.map(|(role,)| role))
}

/// The club, provided `user_id` may see it. Private clubs are members only.
pub async fn visible_club(database: &SqlitePool, club_id: i64, user_id: i64) -> Result<Club> {
    let club = get_club(database, club_id).await?;
    if club.is_private && member_role(database, club_id, user_id).await?.is_none() {
        return Err(Error::Forbidden(
            "You don't have access to this private club".into(),
        ));
    }
    Ok(club)
}

pub async fn require_member(
    database: &SqlitePool,
    club_id: i64,
    user_id: i64,
    action: &str,
) -> Result<MemberRole> {
    get_club(database, club_id).await?;
    member_role(database, club_id, user_id)
        .await?
        .ok_or_else(|| Error::Forbidden(format!("You must be a member to {action}")))
}

pub async fn require_admin(
    database: &SqlitePool,
    club_id: i64,
    user_id: i64,
    action: &str,
) -> Result<MemberRole> {
    get_club(database, club_id).await?;
    match member_role(database, club_id, user_id).await? {
        Some(role) if role.is_admin() => Ok(role),
        _ => Err(Error::Forbidden(format!(
            "You don't have permission to {action}"
        ))),
    }
}

/// Public clubs plus the private ones `user_id` belongs to.
pub async fn list_clubs(
    database: &SqlitePool,
    user_id: i64,
    skip: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<Club>> {
    let (skip, limit) = page_window(skip, limit);
    let clubs = sqlx::query_as::<_, Club>(&format!(
        "{SELECT_CLUB} WHERE c.is_private = 0 OR c.id IN \
         (SELECT club_id FROM club_members WHERE user_id = ?) \
         ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(user_id)
    .bind(limit)
    .bind(skip)
    .fetch_all(database)
    .await?;
    Ok(clubs)
}

pub async fn my_clubs(database: &SqlitePool, user_id: i64) -> Result<Vec<Club>> {
    let clubs = sqlx::query_as::<_, Club>(&format!(
        "{SELECT_CLUB} WHERE c.id IN (SELECT club_id FROM club_members WHERE user_id = ?) \
         ORDER BY c.name"
    ))
    .bind(user_id)
    .fetch_all(database)
    .await?;
    Ok(clubs)
}

/// Create a club; the creator becomes its owner.
pub async fn create_club(
    database: &SqlitePool,
    clock: &dyn Clock,
    user_id: i64,
    new_club: NewClub,
) -> Result<Club> {
    validate_name(&new_club.name)?;
    validate_description(&new_club.description)?;
    validate_max_members(new_club.max_members)?;
    let now = clock.now();
    let mut tx = database.begin().await?;
    let club_id = sqlx::query(
        "INSERT INTO clubs (name, description, cover_image, is_private, created_by_id, \
         max_members, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new_club.name.trim())
    .bind(&new_club.description)
    .bind(&new_club.cover_image)
    .bind(new_club.is_private)
    .bind(user_id)
    .bind(new_club.max_members)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(conflict_on_unique("Club name already exists"))?
    .last_insert_rowid();
    sqlx::query("INSERT INTO club_members (user_id, club_id, role, joined_at) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(club_id)
        .bind(MemberRole::Owner)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    let club = get_club(&mut *tx, club_id).await?;
    tx.commit().await?;
    info!(user_id, club_id, "created club {}", club.name);
    Ok(club)
}

pub async fn update_club(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
    update: ClubUpdate,
) -> Result<Club> {
    require_admin(database, club_id, user_id, "update this club").await?;
    let mut club = get_club(database, club_id).await?;
    if let Some(name) = update.name {
        validate_name(&name)?;
        club.name = name.trim().to_string();
    }
    if let Some(description) = update.description {
        validate_description(&description)?;
        club.description = description;
    }
    if update.cover_image.is_some() {
        club.cover_image = update.cover_image;
    }
    if let Some(is_private) = update.is_private {
        club.is_private = is_private;
    }
    if let Some(max_members) = update.max_members {
        validate_max_members(max_members)?;
        club.max_members = max_members;
    }
    club.updated_at = clock.now();
    sqlx::query(
        "UPDATE clubs SET name = ?, description = ?, cover_image = ?, is_private = ?, \
         max_members = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&club.name)
    .bind(&club.description)
    .bind(&club.cover_image)
    .bind(club.is_private)
    .bind(club.max_members)
    .bind(club.updated_at)
    .bind(club_id)
    .execute(database)
    .await
    .map_err(conflict_on_unique("Club name already exists"))?;
    info!(user_id, club_id, "updated club");
    Ok(club)
}

/// Owner only. Members, reading list, votes and discussions go with the
/// club; reading progress survives without its club reference.
pub async fn delete_club(database: &SqlitePool, club_id: i64, user_id: i64) -> Result<()> {
    get_club(database, club_id).await?;
    if member_role(database, club_id, user_id).await? != Some(MemberRole::Owner) {
        return Err(Error::Forbidden(
            "Only the club owner can delete the club".into(),
        ));
    }
    let mut tx = database.begin().await?;
    sqlx::query(
        "DELETE FROM club_book_votes WHERE club_book_id IN \
         (SELECT id FROM club_books WHERE club_id = ?)",
    )
    .bind(club_id)
    .execute(&mut *tx)
    .await?;
    for statement in [
        "DELETE FROM club_books WHERE club_id = ?",
        "DELETE FROM discussions WHERE club_id = ?",
        "DELETE FROM club_members WHERE club_id = ?",
        "UPDATE reading_progress SET club_id = NULL WHERE club_id = ?",
        "DELETE FROM clubs WHERE id = ?",
    ] {
        sqlx::query(statement)
            .bind(club_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!(user_id, club_id, "deleted club");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::test_support::{insert_book, insert_user, pool};
    use crate::{progress, utils::SystemClock};

    pub fn new_club(name: &str, is_private: bool) -> NewClub {
        NewClub {
            name: name.to_string(),
            description: "We read things".to_string(),
            cover_image: None,
            is_private,
            max_members: DEFAULT_MAX_MEMBERS,
        }
    }

    #[tokio::test]
    async fn creator_is_owner() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Sci-Fi", false))
            .await
            .unwrap();
        assert_eq!(club.member_count, 1);
        assert_eq!(club.created_by_id, alice);
        assert_eq!(
            member_role(&db, club.id, alice).await.unwrap(),
            Some(MemberRole::Owner)
        );
        let err = create_club(&db, &SystemClock, alice, new_club("Sci-Fi", true))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn private_clubs_are_hidden_from_outsiders() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let public = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();
        let secret = create_club(&db, &SystemClock, alice, new_club("Secret", true))
            .await
            .unwrap();

        let seen: Vec<i64> = list_clubs(&db, bob, None, None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(seen, vec![public.id]);
        assert_eq!(list_clubs(&db, alice, None, None).await.unwrap().len(), 2);
        assert!(matches!(
            visible_club(&db, secret.id, bob).await,
            Err(Error::Forbidden(_))
        ));
        assert!(visible_club(&db, secret.id, alice).await.is_ok());
    }

    #[tokio::test]
    async fn only_admins_update() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();
        let update = ClubUpdate {
            max_members: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            update_club(&db, &SystemClock, club.id, bob, update.clone()).await,
            Err(Error::Forbidden(_))
        ));
        let updated = update_club(&db, &SystemClock, club.id, alice, update)
            .await
            .unwrap();
        assert_eq!(updated.max_members, 10);
        let bad = ClubUpdate {
            max_members: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            update_club(&db, &SystemClock, club.id, alice, bad).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn delete_detaches_progress() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let book = insert_book(&db, "vol-1", Some(100)).await;
        let club = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();
        progress::add_to_catalog(&db, &SystemClock, alice, book, Some(club.id))
            .await
            .unwrap();
        reading_list::nominate(&db, &SystemClock, club.id, alice, book)
            .await
            .unwrap();

        delete_club(&db, club.id, alice).await.unwrap();
        assert!(matches!(get_club(&db, club.id).await, Err(Error::NotFound(_))));
        let progress = progress::get_progress(&db, alice, book).await.unwrap();
        assert_eq!(progress.club_id, None);
    }
}
