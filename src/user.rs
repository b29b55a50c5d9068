use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth,
    error::{Error, Result, conflict_on_unique},
    utils::{Clock, page_window},
};

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_NAME_CHARS: usize = 100;

/// Public view of a user; the password hash never leaves this module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub password: Option<String>,
}

#[derive(sqlx::FromRow)]
struct Credentials {
    id: i64,
    password: String,
    is_active: bool,
}

const SELECT_USER: &str = "SELECT id, email, first_name, last_name, avatar, bio, is_active, \
    created_at, updated_at FROM users";

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::Validation("email is not a valid address".into()))
    }
}

fn validate_name(field: &str, value: &str) -> Result<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > MAX_NAME_CHARS {
        return Err(Error::Validation(format!(
            "{field} must be between 1 and {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub async fn register(
    database: &SqlitePool,
    clock: &dyn Clock,
    request: RegisterRequest,
) -> Result<UserInfo> {
    let email = request.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_password(&request.password)?;
    validate_name("firstName", &request.first_name)?;
    validate_name("lastName", &request.last_name)?;

    let password_hash = auth::hash_password(&request.password)?;
    let now = clock.now();
    let id = sqlx::query(
        "INSERT INTO users (email, password, first_name, last_name, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, ?, ?)",
    )
    .bind(&email)
    .bind(password_hash)
    .bind(request.first_name.trim())
    .bind(request.last_name.trim())
    .bind(now)
    .bind(now)
    .execute(database)
    .await
    .map_err(conflict_on_unique("Email already registered"))?
    .last_insert_rowid();
    info!(user_id = id, "registered user {email}");
    get_user(database, id).await
}

/// Check email and password; inactive accounts are refused after a valid password.
pub async fn authenticate(database: &SqlitePool, email: &str, password: &str) -> Result<UserInfo> {
    let email = email.trim().to_lowercase();
    let credentials = sqlx::query_as::<_, Credentials>(
        "SELECT id, password, is_active FROM users WHERE email = ?",
    )
    .bind(&email)
    .fetch_optional(database)
    .await?;
    let Some(credentials) = credentials else {
        return Err(Error::Unauthorized("Incorrect email or password".into()));
    };
    if !auth::verify_password(password, &credentials.password) {
        return Err(Error::Unauthorized("Incorrect email or password".into()));
    }
    if !credentials.is_active {
        return Err(Error::Forbidden("Inactive user".into()));
    }
    get_user(database, credentials.id).await
}

/// Any user, active or not.
pub async fn get_user(database: &SqlitePool, id: i64) -> Result<UserInfo> {
    sqlx::query_as::<_, UserInfo>(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or_else(|| Error::not_found("User"))
}

pub async fn get_active_user(database: &SqlitePool, id: i64) -> Result<UserInfo> {
    let user = get_user(database, id).await?;
    if !user.is_active {
        return Err(Error::not_found("User"));
    }
    Ok(user)
}

pub async fn list_users(
    database: &SqlitePool,
    skip: Option<i64>,
    limit: Option<i64>,
) -> Result<Vec<UserInfo>> {
    let (skip, limit) = page_window(skip, limit);
    let users = sqlx::query_as::<_, UserInfo>(&format!(
        "{SELECT_USER} WHERE is_active = 1 ORDER BY id LIMIT ? OFFSET ?"
    ))
    .bind(limit)
    .bind(skip)
    .fetch_all(database)
    .await?;
    Ok(users)
}

/// Every user, for the admin tool.
pub async fn list_all_users(database: &SqlitePool) -> Result<Vec<UserInfo>> {
    let users = sqlx::query_as::<_, UserInfo>(&format!("{SELECT_USER} ORDER BY id"))
        .fetch_all(database)
        .await?;
    Ok(users)
}

pub async fn update_user(
    database: &SqlitePool,
    clock: &dyn Clock,
    id: i64,
    update: UserUpdate,
) -> Result<UserInfo> {
    let mut user = get_user(database, id).await?;
    if let Some(first_name) = update.first_name {
        validate_name("firstName", &first_name)?;
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = update.last_name {
        validate_name("lastName", &last_name)?;
        user.last_name = last_name.trim().to_string();
    }
    if let Some(avatar) = update.avatar {
        user.avatar = Some(avatar);
    }
    if let Some(bio) = update.bio {
        user.bio = Some(bio);
    }
    let password_hash = match update.password {
        Some(password) => {
            validate_password(&password)?;
            Some(auth::hash_password(&password)?)
        }
        None => None,
    };
    user.updated_at = clock.now();

    sqlx::query(
        "UPDATE users SET first_name = ?, last_name = ?, avatar = ?, bio = ?, \
         password = COALESCE(?, password), updated_at = ? WHERE id = ?",
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.avatar)
    .bind(&user.bio)
    .bind(password_hash)
    .bind(user.updated_at)
    .bind(id)
    .execute(database)
    .await?;
    info!(user_id = id, "updated profile");
    Ok(user)
}

/// Soft delete: the account is kept but marked inactive, and its plain
/// memberships are dropped along with the votes cast in those clubs.
/// Clubs it owns keep their owner row.
pub async fn deactivate_user(database: &SqlitePool, clock: &dyn Clock, id: i64) -> Result<()> {
    let mut tx = database.begin().await?;
    let result = sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(clock.now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found("User"));
    }
    sqlx::query(
        "DELETE FROM club_book_votes WHERE user_id = ? AND club_book_id IN \
         (SELECT cb.id FROM club_books cb JOIN club_members m ON m.club_id = cb.club_id \
          WHERE m.user_id = ? AND m.role != 'owner')",
    )
    .bind(id)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM club_members WHERE user_id = ? AND role != 'owner'")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(user_id = id, "deactivated user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::pool;
    use crate::utils::SystemClock;

    fn request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "hunter2hunter2".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let db = pool().await;
        let user = register(&db, &SystemClock, request("Ada@Example.com "))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert!(user.is_active);

        let logged_in = authenticate(&db, "ada@example.com", "hunter2hunter2")
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(matches!(
            authenticate(&db, "ada@example.com", "wrong-password").await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&db, "nobody@example.com", "hunter2hunter2").await,
            Err(Error::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = pool().await;
        register(&db, &SystemClock, request("ada@example.com"))
            .await
            .unwrap();
        let err = register(&db, &SystemClock, request("ADA@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let db = pool().await;
        let mut bad_email = request("not-an-email");
        assert!(matches!(
            register(&db, &SystemClock, bad_email.clone()).await,
            Err(Error::Validation(_))
        ));
        bad_email.email = "ada@example.com".into();
        bad_email.password = "short".into();
        assert!(matches!(
            register(&db, &SystemClock, bad_email.clone()).await,
            Err(Error::Validation(_))
        ));
        bad_email.password = "long-enough".into();
        bad_email.first_name = "  ".into();
        assert!(matches!(
            register(&db, &SystemClock, bad_email).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_changes_password() {
        let db = pool().await;
        let user = register(&db, &SystemClock, request("ada@example.com"))
            .await
            .unwrap();
        let update = UserUpdate {
            bio: Some("Analyst".into()),
            password: Some("new-password-1".into()),
            ..Default::default()
        };
        let updated = update_user(&db, &SystemClock, user.id, update).await.unwrap();
        assert_eq!(updated.bio.as_deref(), Some("Analyst"));
        assert_eq!(updated.first_name, "Ada");
        assert!(authenticate(&db, "ada@example.com", "new-password-1").await.is_ok());
    }

    #[tokio::test]
    async fn deactivated_user_is_hidden_and_cannot_login() {
        let db = pool().await;
        let user = register(&db, &SystemClock, request("ada@example.com"))
            .await
            .unwrap();
        deactivate_user(&db, &SystemClock, user.id).await.unwrap();
        assert!(matches!(
            get_active_user(&db, user.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(list_users(&db, None, None).await.unwrap().is_empty());
        assert!(matches!(
            authenticate(&db, "ada@example.com", "hunter2hunter2").await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn deactivation_withdraws_club_votes() {
        use crate::club::{self, member, reading_list, tests::new_club};
        use crate::database::test_support::insert_book;

        let db = pool().await;
        let owner = register(&db, &SystemClock, request("owner@example.com"))
            .await
            .unwrap();
        let bob = register(&db, &SystemClock, request("bob@example.com"))
            .await
            .unwrap();
        let book_id = insert_book(&db, "vol-1", Some(200)).await;
        let club = club::create_club(&db, &SystemClock, owner.id, new_club("Readers", false))
            .await
            .unwrap();
        member::join_club(&db, &SystemClock, club.id, bob.id)
            .await
            .unwrap();
        reading_list::nominate(&db, &SystemClock, club.id, bob.id, book_id)
            .await
            .unwrap();
        let entry = reading_list::vote(&db, &SystemClock, club.id, bob.id, book_id)
            .await
            .unwrap();
        assert_eq!(entry.vote_count, 1);

        deactivate_user(&db, &SystemClock, bob.id).await.unwrap();

        let members = member::list_members(&db, club.id, owner.id).await.unwrap();
        assert_eq!(members.len(), 1);
        let books = reading_list::list_club_books(&db, club.id, owner.id, None)
            .await
            .unwrap();
        assert_eq!(books[0].vote_count, 0);
    }
}
