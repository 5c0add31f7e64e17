use anyhow::Result;

use super::schema::Database;
use super::types::{encode_list, Feed, FeedRow};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Count feed records with the given URL.
    ///
    /// The unique key on feeds.url means the answer is 0 or 1 under correct
    /// operation; callers treat any other value as a data-integrity fault.
    pub async fn count_feeds_with_url(&self, url: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Look up a single feed by its URL.
    pub async fn find_feed(&self, url: &str) -> Result<Option<Feed>> {
        let row: Option<FeedRow> = sqlx::query_as(
            r#"
            SELECT url, title, description, link, xml_url, published, updated,
                   author, language, image_title, image_url, favicon,
                   copyright, generator, categories, validator, fetched_at
            FROM feeds
            WHERE url = ?
        "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Get all stored feeds
    pub async fn all_feeds(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
            SELECT url, title, description, link, xml_url, published, updated,
                   author, language, image_title, image_url, favicon,
                   copyright, generator, categories, validator, fetched_at
            FROM feeds
            ORDER BY url
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Save a feed, replacing every field of any existing record with the
    /// same URL (INSERT .. ON CONFLICT DO UPDATE). Saves are whole-record:
    /// the caller decides whether a write is warranted at all.
    pub async fn save_feed(&self, feed: &Feed) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (url, title, description, link, xml_url,
                               published, updated, author, language,
                               image_title, image_url, favicon, copyright,
                               generator, categories, validator, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                link = excluded.link,
                xml_url = excluded.xml_url,
                published = excluded.published,
                updated = excluded.updated,
                author = excluded.author,
                language = excluded.language,
                image_title = excluded.image_title,
                image_url = excluded.image_url,
                favicon = excluded.favicon,
                copyright = excluded.copyright,
                generator = excluded.generator,
                categories = excluded.categories,
                validator = excluded.validator,
                fetched_at = excluded.fetched_at
        "#,
        )
        .bind(&feed.url)
        .bind(&feed.title)
        .bind(&feed.description)
        .bind(&feed.link)
        .bind(&feed.xml_url)
        .bind(feed.published)
        .bind(feed.updated)
        .bind(&feed.author)
        .bind(&feed.language)
        .bind(feed.image.as_ref().and_then(|i| i.title.as_deref()))
        .bind(feed.image.as_ref().map(|i| i.url.as_str()))
        .bind(&feed.favicon)
        .bind(&feed.copyright)
        .bind(&feed.generator)
        .bind(encode_list(&feed.categories))
        .bind(&feed.validator)
        .bind(feed.fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a feed by URL. Returns true if a record was removed.
    ///
    /// Articles referencing the URL are not touched here; callers run the
    /// cascade via `delete_articles_for_feed`.
    pub async fn delete_feed(&self, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feeds WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
