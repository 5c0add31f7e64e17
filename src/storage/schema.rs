use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store is unreachable
    /// (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN). Callers treat this as
    /// fatal. Returns `StorageError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to
        // release before returning SQLITE_BUSY. Handles transient contention
        // between overlapping refresh cycles. pragma() on the options makes
        // every pooled connection inherit the setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // SQLite is single-writer; 5 connections covers peak concurrent
        // readers (parallel feed cycles + keyword queries).
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StorageError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                StorageError::Connection(e.to_string())
            } else {
                StorageError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All schema changes are wrapped in a single transaction so a failure
    /// mid-migration (disk full, power loss) rolls back to the previous
    /// consistent state. All statements use `IF NOT EXISTS` for idempotency,
    /// so re-running on an existing database is a no-op.
    ///
    /// Articles carry no foreign key to feeds: the feed_url column is a weak
    /// back-reference and cascade removal is an explicit store operation.
    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                url TEXT PRIMARY KEY,
                title TEXT,
                description TEXT,
                link TEXT,
                xml_url TEXT,
                published INTEGER,
                updated INTEGER,
                author TEXT,
                language TEXT,
                image_title TEXT,
                image_url TEXT,
                favicon TEXT,
                copyright TEXT,
                generator TEXT,
                categories TEXT NOT NULL DEFAULT '[]',
                validator TEXT,
                fetched_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                guid TEXT NOT NULL,
                feed_url TEXT NOT NULL,
                title TEXT,
                description TEXT,
                link TEXT,
                original_link TEXT,
                published INTEGER,
                updated INTEGER,
                author TEXT,
                comments TEXT,
                image_title TEXT,
                image_url TEXT,
                categories TEXT NOT NULL DEFAULT '[]',
                source_title TEXT,
                source_url TEXT,
                enclosures TEXT NOT NULL DEFAULT '[]',
                fetched_at INTEGER,
                PRIMARY KEY (guid, feed_url)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_feed_url ON articles(feed_url)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
