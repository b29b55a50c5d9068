use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tracing::info;

/// Open the SQLite pool and apply the embedded migrations.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let in_memory = url.contains(":memory:");
    let mut pool_options = SqlitePoolOptions::new();
    if in_memory {
        // every connection to :memory: is its own database
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    } else {
        pool_options = pool_options.max_connections(10);
    }
    let pool = pool_options.connect_with(options).await?;
    migrate(&pool).await?;
    info!("database ready at {url}");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::SqlitePool;
    use time::OffsetDateTime;

    pub async fn pool() -> SqlitePool {
        super::connect("sqlite::memory:").await.unwrap()
    }

    pub async fn insert_user(db: &SqlitePool, email: &str) -> i64 {
        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO users (email, password, first_name, last_name, is_active, created_at, updated_at) \
             VALUES (?, 'x', 'Test', 'User', 1, ?, ?)",
        )
        .bind(email)
        .bind(now)
        .bind(now)
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    pub async fn insert_book(db: &SqlitePool, google_id: &str, page_count: Option<i64>) -> i64 {
        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO books (google_books_id, title, author, page_count, average_rating, created_at, updated_at) \
             VALUES (?, 'A Book', 'An Author', ?, 0.0, ?, ?)",
        )
        .bind(google_id)
        .bind(page_count)
        .bind(now)
        .bind(now)
        .execute(db)
        .await
        .unwrap()
        .last_insert_rowid()
    }
}
