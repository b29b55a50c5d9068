use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    book,
    club::{member_role, require_member, visible_club},
    error::{Error, Result},
    utils::{Clock, page_window},
};

const MAX_TITLE_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: i64,
    pub club_id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub parent_id: Option<i64>,
    pub title: Option<String>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub reply_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscussion {
    pub book_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
}

fn validate_title(title: Option<&str>) -> Result<()> {
    if title.is_some_and(|t| t.chars().count() > MAX_TITLE_CHARS) {
        return Err(Error::Validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("content must not be empty".into()));
    }
    Ok(())
}

const SELECT_DISCUSSION: &str = "SELECT d.id, d.club_id, d.user_id, d.book_id, d.parent_id, \
    d.title, d.content, d.created_at, d.updated_at, \
    (SELECT COUNT(*) FROM discussions r WHERE r.parent_id = d.id) AS reply_count \
    FROM discussions d";

async fn find(database: &SqlitePool, id: i64) -> Result<Discussion> {
    sqlx::query_as::<_, Discussion>(&format!("{SELECT_DISCUSSION} WHERE d.id = ?"))
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or_else(|| Error::not_found("Discussion"))
}

/// Top-level threads of a club, newest first.
pub async fn list_discussions(
    database: &SqlitePool,
    club_id: i64,
    viewer_id: i64,
    book_id: Option<i64>,
    skip: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<Discussion>> {
    visible_club(database, club_id, viewer_id).await?;
    let (skip, limit) = page_window(skip, limit);
    let discussions = sqlx::query_as::<_, Discussion>(&format!(
        "{SELECT_DISCUSSION} WHERE d.club_id = ? AND d.parent_id IS NULL \
         AND (? IS NULL OR d.book_id = ?) \
         ORDER BY d.created_at DESC, d.id DESC LIMIT ? OFFSET ?"
    ))
    .bind(club_id)
    .bind(book_id)
    .bind(book_id)
    .bind(limit)
    .bind(skip)
    .fetch_all(database)
    .await?;
    Ok(discussions)
}

pub async fn create_discussion(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
    new: NewDiscussion,
) -> Result<Discussion> {
    validate_title(new.title.as_deref())?;
    validate_content(&new.content)?;
    require_member(database, club_id, user_id, "create discussions").await?;
    book::page_count(database, new.book_id).await?;
    if let Some(parent_id) = new.parent_id {
        let parent = find(database, parent_id).await.map_err(|e| match e {
            Error::NotFound(_) => Error::not_found("Parent discussion"),
            other => other,
        })?;
        if parent.club_id != club_id {
            return Err(Error::BadRequest(
                "Parent discussion belongs to another club".into(),
            ));
        }
    }
    let now = clock.now();
    let id = sqlx::query(
        "INSERT INTO discussions (club_id, user_id, book_id, parent_id, title, content, \
         created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(club_id)
    .bind(user_id)
    .bind(new.book_id)
    .bind(new.parent_id)
    .bind(&new.title)
    .bind(&new.content)
    .bind(now)
    .bind(now)
    .execute(database)
    .await?
    .last_insert_rowid();
    info!(user_id, club_id, discussion_id = id, "created discussion");
    find(database, id).await
}

pub async fn get_discussion(database: &SqlitePool, id: i64, viewer_id: i64) -> Result<Discussion> {
    let discussion = find(database, id).await?;
    visible_club(database, discussion.club_id, viewer_id)
        .await
        .map_err(|e| match e {
            Error::Forbidden(_) => {
                Error::Forbidden("You don't have access to this discussion".into())
            }
            other => other,
        })?;
    Ok(discussion)
}

/// Replies to one discussion, oldest first.
pub async fn list_replies(
    database: &SqlitePool,
    id: i64,
    viewer_id: i64,
) -> Result<Vec<Discussion>> {
    get_discussion(database, id, viewer_id).await?;
    let replies = sqlx::query_as::<_, Discussion>(&format!(
        "{SELECT_DISCUSSION} WHERE d.parent_id = ? ORDER BY d.created_at, d.id"
    ))
    .bind(id)
    .fetch_all(database)
    .await?;
    Ok(replies)
}

pub async fn update_discussion(
    database: &SqlitePool,
    clock: &dyn Clock,
    id: i64,
    user_id: i64,
    update: DiscussionUpdate,
) -> Result<Discussion> {
    let mut discussion = find(database, id).await?;
    if discussion.user_id != user_id {
        return Err(Error::Forbidden(
            "You can only edit your own discussions".into(),
        ));
    }
    if let Some(title) = update.title {
        validate_title(Some(&title))?;
        discussion.title = Some(title);
    }
    if let Some(content) = update.content {
        validate_content(&content)?;
        discussion.content = content;
    }
    discussion.updated_at = clock.now();
    sqlx::query("UPDATE discussions SET title = ?, content = ?, updated_at = ? WHERE id = ?")
        .bind(&discussion.title)
        .bind(&discussion.content)
        .bind(discussion.updated_at)
        .bind(id)
        .execute(database)
        .await?;
    info!(user_id, discussion_id = id, "updated discussion");
    Ok(discussion)
}

/// The author or a club admin may delete; the whole reply subtree goes too.
pub async fn delete_discussion(database: &SqlitePool, id: i64, user_id: i64) -> Result<()> {
    let discussion = find(database, id).await?;
    let is_admin = member_role(database, discussion.club_id, user_id)
        .await?
        .is_some_and(|role| role.is_admin());
    if discussion.user_id != user_id && !is_admin {
        return Err(Error::Forbidden(
            "You don't have permission to delete this discussion".into(),
        ));
    }
    let removed = sqlx::query(
        "WITH RECURSIVE doomed(id) AS ( \
             SELECT ? \
             UNION SELECT d.id FROM discussions d JOIN doomed ON d.parent_id = doomed.id) \
         DELETE FROM discussions WHERE id IN (SELECT id FROM doomed)",
    )
    .bind(id)
    .execute(database)
    .await?
    .rows_affected();
    info!(user_id, discussion_id = id, removed, "deleted discussion");
    Ok(())
}
