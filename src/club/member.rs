use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use super::{MemberRole, get_club, member_role, visible_club};
use crate::{
    error::{Error, Result, conflict_on_unique},
    utils::Clock,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClubMember {
    pub id: i64,
    pub user_id: i64,
    pub club_id: i64,
    pub role: MemberRole,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleChange {
    pub role: MemberRole,
}

const SELECT_MEMBER: &str = "SELECT m.id, m.user_id, m.club_id, m.role, m.joined_at, \
    u.email, u.first_name, u.last_name FROM club_members m JOIN users u ON u.id = m.user_id";

async fn get_member(database: &SqlitePool, club_id: i64, user_id: i64) -> Result<ClubMember> {
    sqlx::query_as::<_, ClubMember>(&format!(
        "{SELECT_MEMBER} WHERE m.club_id = ? AND m.user_id = ?"
    ))
    .bind(club_id)
    .bind(user_id)
    .fetch_optional(database)
    .await?
    .ok_or_else(|| Error::not_found("Member"))
}

/// Owner first, then admins, then members by join date.
pub async fn list_members(
    database: &SqlitePool,
    club_id: i64,
    viewer_id: i64,
) -> Result<Vec<ClubMember>> {
    visible_club(database, club_id, viewer_id).await?;
    let members = sqlx::query_as::<_, ClubMember>(&format!(
        "{SELECT_MEMBER} WHERE m.club_id = ? ORDER BY \
         CASE m.role WHEN 'owner' THEN 0 WHEN 'admin' THEN 1 ELSE 2 END, m.joined_at, m.id"
    ))
    .bind(club_id)
    .fetch_all(database)
    .await?;
    Ok(members)
}

pub async fn join_club(
    database: &SqlitePool,
    clock: &dyn Clock,
    club_id: i64,
    user_id: i64,
) -> Result<ClubMember> {
    let mut tx = database.begin().await?;
    let club = get_club(&mut *tx, club_id).await?;
    if member_role(&mut *tx, club_id, user_id).await?.is_some() {
        return Err(Error::Conflict(
            "You are already a member of this club".into(),
        ));
    }
    if club.member_count >= club.max_members {
        return Err(Error::Conflict("Club has reached maximum members".into()));
    }
    sqlx::query("INSERT INTO club_members (user_id, club_id, role, joined_at) VALUES (?, ?, ?, ?)")
        .bind(user_id)
        .bind(club_id)
        .bind(MemberRole::Member)
        .bind(clock.now())
        .execute(&mut *tx)
        .await
        .map_err(conflict_on_unique("You are already a member of this club"))?;
    tx.commit().await?;
    info!(user_id, club_id, "joined club");
    get_member(database, club_id, user_id).await
}

pub async fn leave_club(database: &SqlitePool, club_id: i64, user_id: i64) -> Result<()> {
    get_club(database, club_id).await?;
    match member_role(database, club_id, user_id).await? {
        None => Err(Error::BadRequest(
            "You are not a member of this club".into(),
        )),
        Some(MemberRole::Owner) => Err(Error::BadRequest(
            "Club owner cannot leave the club. Transfer ownership or delete the club.".into(),
        )),
        Some(_) => {
            delete_membership(database, club_id, user_id).await?;
            info!(user_id, club_id, "left club");
            Ok(())
        }
    }
}

async fn delete_membership(database: &SqlitePool, club_id: i64, user_id: i64) -> Result<()> {
    let mut tx = database.begin().await?;
    sqlx::query(
        "DELETE FROM club_book_votes WHERE user_id = ? AND club_book_id IN \
         (SELECT id FROM club_books WHERE club_id = ?)",
    )
    .bind(user_id)
    .bind(club_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM club_members WHERE club_id = ? AND user_id = ?")
        .bind(club_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Owner only. Handing out `owner` transfers ownership and the previous
/// owner becomes an admin.
pub async fn change_role(
    database: &SqlitePool,
    club_id: i64,
    actor_id: i64,
    target_id: i64,
    role: MemberRole,
) -> Result<ClubMember> {
    get_club(database, club_id).await?;
    if member_role(database, club_id, actor_id).await? != Some(MemberRole::Owner) {
        return Err(Error::Forbidden(
            "Only the club owner can change member roles".into(),
        ));
    }
    if member_role(database, club_id, target_id).await?.is_none() {
        return Err(Error::not_found("Member"));
    }
    if target_id == actor_id {
        if role != MemberRole::Owner {
            return Err(Error::BadRequest(
                "Transfer ownership before changing your own role".into(),
            ));
        }
        return get_member(database, club_id, target_id).await;
    }

    let mut tx = database.begin().await?;
    if role == MemberRole::Owner {
        sqlx::query("UPDATE club_members SET role = ? WHERE club_id = ? AND user_id = ?")
            .bind(MemberRole::Admin)
            .bind(club_id)
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE club_members SET role = ? WHERE club_id = ? AND user_id = ?")
        .bind(role)
        .bind(club_id)
        .bind(target_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(
        user_id = actor_id,
        club_id,
        target_id,
        role = ?role,
        "changed member role"
    );
    get_member(database, club_id, target_id).await
}

/// Admins remove members; only the owner removes admins; nobody removes the owner.
pub async fn remove_member(
    database: &SqlitePool,
    club_id: i64,
    actor_id: i64,
    target_id: i64,
) -> Result<()> {
    get_club(database, club_id).await?;
    let actor = match member_role(database, club_id, actor_id).await? {
        Some(role) if role.is_admin() => role,
        _ => {
            return Err(Error::Forbidden(
                "You don't have permission to remove members".into(),
            ));
        }
    };
    match member_role(database, club_id, target_id).await? {
        None => return Err(Error::not_found("Member")),
        Some(MemberRole::Owner) => {
            return Err(Error::Forbidden(
                "The club owner cannot be removed".into(),
            ));
        }
        Some(MemberRole::Admin) if actor != MemberRole::Owner => {
            return Err(Error::Forbidden(
                "Only the club owner can remove admins".into(),
            ));
        }
        Some(_) => {}
    }
    delete_membership(database, club_id, target_id).await?;
    info!(user_id = actor_id, club_id, target_id, "removed member");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::club::{create_club, tests::new_club, update_club, ClubUpdate};
    use crate::database::test_support::{insert_user, pool};
    use crate::utils::SystemClock;

    #[tokio::test]
    async fn join_and_leave() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();

        let member = join_club(&db, &SystemClock, club.id, bob).await.unwrap();
        assert_eq!(member.role, MemberRole::Member);
        assert_eq!(member.email, "bob@example.com");
        assert!(matches!(
            join_club(&db, &SystemClock, club.id, bob).await,
            Err(Error::Conflict(_))
        ));

        let members = list_members(&db, club.id, bob).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].role, MemberRole::Owner);

        leave_club(&db, club.id, bob).await.unwrap();
        assert!(matches!(
            leave_club(&db, club.id, bob).await,
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            leave_club(&db, club.id, alice).await,
            Err(Error::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn full_club_rejects_joins() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let carol = insert_user(&db, "carol@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Tiny", false))
            .await
            .unwrap();
        let update = ClubUpdate {
            max_members: Some(2),
            ..Default::default()
        };
        update_club(&db, &SystemClock, club.id, alice, update)
            .await
            .unwrap();
        join_club(&db, &SystemClock, club.id, bob).await.unwrap();
        let err = join_club(&db, &SystemClock, club.id, carol).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(msg) if msg.contains("maximum")));
    }

    #[tokio::test]
    async fn ownership_transfer_demotes_previous_owner() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();
        join_club(&db, &SystemClock, club.id, bob).await.unwrap();

        assert!(matches!(
            change_role(&db, club.id, bob, alice, MemberRole::Member).await,
            Err(Error::Forbidden(_))
        ));
        let promoted = change_role(&db, club.id, alice, bob, MemberRole::Owner)
            .await
            .unwrap();
        assert_eq!(promoted.role, MemberRole::Owner);
        assert_eq!(
            member_role(&db, club.id, alice).await.unwrap(),
            Some(MemberRole::Admin)
        );
        // the former owner may now leave
        leave_club(&db, club.id, alice).await.unwrap();
    }

    #[tokio::test]
    async fn removal_rules() {
        let db = pool().await;
        let alice = insert_user(&db, "alice@example.com").await;
        let bob = insert_user(&db, "bob@example.com").await;
        let carol = insert_user(&db, "carol@example.com").await;
        let club = create_club(&db, &SystemClock, alice, new_club("Open", false))
            .await
            .unwrap();
        join_club(&db, &SystemClock, club.id, bob).await.unwrap();
        join_club(&db, &SystemClock, club.id, carol).await.unwrap();

        assert!(matches!(
            remove_member(&db, club.id, carol, bob).await,
            Err(Error::Forbidden(_))
        ));
        change_role(&db, club.id, alice, bob, MemberRole::Admin)
            .await
            .unwrap();
        assert!(matches!(
            remove_member(&db, club.id, bob, alice).await,
            Err(Error::Forbidden(_))
        ));
        remove_member(&db, club.id, bob, carol).await.unwrap();
        assert_eq!(member_role(&db, club.id, carol).await.unwrap(), None);
        assert!(matches!(
            remove_member(&db, club.id, bob, carol).await,
            Err(Error::NotFound(_))
        ));
    }
}
