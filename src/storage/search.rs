use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleRow};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

impl Database {
    // ========================================================================
    // Keyword Search
    // ========================================================================

    /// Find articles whose title, description or author contains the keyword
    /// (case-insensitive substring match), capped at `limit` results.
    pub async fn articles_matching_keyword(&self, keyword: &str, limit: i64) -> Result<Vec<Article>> {
        self.articles_matching_keywords(std::slice::from_ref(&keyword), limit)
            .await
    }

    /// Find articles matching ANY of the keywords against title, description
    /// or author, capped at `limit` results. An empty keyword matches every
    /// article; an empty keyword list matches none.
    pub async fn articles_matching_keywords<S: AsRef<str>>(
        &self,
        keywords: &[S],
        limit: i64,
    ) -> Result<Vec<Article>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let limit = limit.clamp(0, MAX_ARTICLES);

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            r#"
            SELECT guid, feed_url, title, description, link, original_link,
                   published, updated, author, comments, image_title,
                   image_url, categories, source_title, source_url,
                   enclosures, fetched_at
            FROM articles
            WHERE
        "#,
        );

        // One (title LIKE ? OR description LIKE ? OR author LIKE ?) group
        // per keyword, groups joined with OR. LIKE is case-insensitive for
        // ASCII in SQLite; % and _ in keywords are escaped so they match
        // literally.
        for (i, keyword) in keywords.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            let pattern = format!("%{}%", escape_like(keyword.as_ref()));
            builder.push("(title LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR description LIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" ESCAPE '\\' OR author LIKE ");
            builder.push_bind(pattern);
            builder.push(" ESCAPE '\\')");
        }

        builder.push(" ORDER BY published DESC, fetched_at DESC LIMIT ");
        builder.push_bind(limit);

        let rows: Vec<ArticleRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }
}

/// Escape LIKE wildcards so keywords match as literal text.
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
