use anyhow::Result;

use super::schema::Database;
use super::types::{encode_list, Article, ArticleRow};

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Look up a single article by its (guid, feed URL) identity key.
    pub async fn find_article(&self, guid: &str, feed_url: &str) -> Result<Option<Article>> {
        let row: Option<ArticleRow> = sqlx::query_as(
            r#"
            SELECT guid, feed_url, title, description, link, original_link,
                   published, updated, author, comments, image_title,
                   image_url, categories, source_title, source_url,
                   enclosures, fetched_at
            FROM articles
            WHERE guid = ? AND feed_url = ?
        "#,
        )
        .bind(guid)
        .bind(feed_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleRow::into_article))
    }

    /// Get all articles belonging to a feed, newest first.
    pub async fn articles_for_feed(&self, feed_url: &str) -> Result<Vec<Article>> {
        let rows: Vec<ArticleRow> = sqlx::query_as(
            r#"
            SELECT guid, feed_url, title, description, link, original_link,
                   published, updated, author, comments, image_title,
                   image_url, categories, source_title, source_url,
                   enclosures, fetched_at
            FROM articles
            WHERE feed_url = ?
            ORDER BY published DESC, fetched_at DESC
        "#,
        )
        .bind(feed_url)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }

    /// Save an article, replacing every field of any existing record with
    /// the same (guid, feed_url) key.
    pub async fn save_article(&self, article: &Article) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO articles (guid, feed_url, title, description, link,
                                  original_link, published, updated, author,
                                  comments, image_title, image_url,
                                  categories, source_title, source_url,
                                  enclosures, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid, feed_url) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                link = excluded.link,
                original_link = excluded.original_link,
                published = excluded.published,
                updated = excluded.updated,
                author = excluded.author,
                comments = excluded.comments,
                image_title = excluded.image_title,
                image_url = excluded.image_url,
                categories = excluded.categories,
                source_title = excluded.source_title,
                source_url = excluded.source_url,
                enclosures = excluded.enclosures,
                fetched_at = excluded.fetched_at
        "#,
        )
        .bind(&article.guid)
        .bind(&article.feed_url)
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.link)
        .bind(&article.original_link)
        .bind(article.published)
        .bind(article.updated)
        .bind(&article.author)
        .bind(&article.comments)
        .bind(article.image.as_ref().and_then(|i| i.title.as_deref()))
        .bind(article.image.as_ref().map(|i| i.url.as_str()))
        .bind(encode_list(&article.categories))
        .bind(article.source.as_ref().and_then(|s| s.title.as_deref()))
        .bind(article.source.as_ref().map(|s| s.url.as_str()))
        .bind(encode_list(&article.enclosures))
        .bind(article.fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete every article referencing a feed URL (the explicit cascade run
    /// after the owning feed is removed). Returns the number of rows deleted.
    pub async fn delete_articles_for_feed(&self, feed_url: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE feed_url = ?")
            .bind(feed_url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Bulk-delete articles whose published date precedes the cutoff
    /// (unix seconds). Articles without a date are kept: a NULL date never
    /// precedes the cutoff. Returns the number of rows deleted.
    pub async fn delete_articles_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE published < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Total number of stored articles.
    pub async fn count_articles(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
