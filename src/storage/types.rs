use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store could not be reached or opened at all
    #[error("Could not connect to the store: {0}")]
    Connection(String),

    /// Migration failed
    #[error("Store migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Store error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Classify a sqlx error raised while opening the store.
    ///
    /// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all mean
    /// the store is unreachable for this process, which is fatal at startup.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::Connection(err.to_string());
        }

        StorageError::Other(err)
    }
}

// ============================================================================
// Value Types
// ============================================================================

/// Title + URL pair used for feed/article images and article sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitledLink {
    pub title: Option<String>,
    pub url: String,
}

/// A media attachment on an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: Option<String>,
    pub length: Option<i64>,
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed. Identity is the subscription URL; at most one record
/// exists per URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub xml_url: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub image: Option<TitledLink>,
    pub favicon: Option<String>,
    pub copyright: Option<String>,
    pub generator: Option<String>,
    pub categories: Vec<String>,
    /// Opaque cache validator from the last successful fetch (the server's
    /// Last-Modified value), sent back as a precondition on the next fetch.
    pub validator: Option<String>,
    /// When the record was last written by a refresh cycle (unix seconds).
    pub fetched_at: Option<i64>,
}

impl Feed {
    /// A bare feed record for a URL that has never been fetched.
    pub fn new(url: impl Into<String>) -> Self {
        Feed {
            url: url.into(),
            title: None,
            description: None,
            link: None,
            xml_url: None,
            published: None,
            updated: None,
            author: None,
            language: None,
            image: None,
            favicon: None,
            copyright: None,
            generator: None,
            categories: Vec::new(),
            validator: None,
            fetched_at: None,
        }
    }

    /// Identity key: the subscription URL.
    pub fn key(&self) -> &str {
        &self.url
    }
}

/// One content item belonging to a feed. Identity is (guid, feed_url);
/// a guid alone is not unique across feeds. The feed_url back-reference is
/// a weak lookup key, not an owning pointer; cascade removal is an explicit
/// operation on the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub guid: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub original_link: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
    pub author: Option<String>,
    pub comments: Option<String>,
    pub image: Option<TitledLink>,
    pub categories: Vec<String>,
    pub source: Option<TitledLink>,
    pub enclosures: Vec<Enclosure>,
    /// When the record was last written by a refresh cycle (unix seconds).
    pub fetched_at: Option<i64>,
}

impl Article {
    /// Identity key: (guid, owning feed URL).
    pub fn key(&self) -> (&str, &str) {
        (&self.guid, &self.feed_url)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow).
/// Converts to Feed via into_feed(), decoding the JSON list column.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub xml_url: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub image_title: Option<String>,
    pub image_url: Option<String>,
    pub favicon: Option<String>,
    pub copyright: Option<String>,
    pub generator: Option<String>,
    pub categories: String,
    pub validator: Option<String>,
    pub fetched_at: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            url: self.url,
            title: self.title,
            description: self.description,
            link: self.link,
            xml_url: self.xml_url,
            published: self.published,
            updated: self.updated,
            author: self.author,
            language: self.language,
            image: self.image_url.map(|url| TitledLink {
                title: self.image_title,
                url,
            }),
            favicon: self.favicon,
            copyright: self.copyright,
            generator: self.generator,
            categories: decode_list(&self.categories),
            validator: self.validator,
            fetched_at: self.fetched_at,
        }
    }
}

/// Internal row type for article queries (used by sqlx FromRow).
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleRow {
    pub guid: String,
    pub feed_url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub original_link: Option<String>,
    pub published: Option<i64>,
    pub updated: Option<i64>,
    pub author: Option<String>,
    pub comments: Option<String>,
    pub image_title: Option<String>,
    pub image_url: Option<String>,
    pub categories: String,
    pub source_title: Option<String>,
    pub source_url: Option<String>,
    pub enclosures: String,
    pub fetched_at: Option<i64>,
}

impl ArticleRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            guid: self.guid,
            feed_url: self.feed_url,
            title: self.title,
            description: self.description,
            link: self.link,
            original_link: self.original_link,
            published: self.published,
            updated: self.updated,
            author: self.author,
            comments: self.comments,
            image: self.image_url.map(|url| TitledLink {
                title: self.image_title,
                url,
            }),
            categories: decode_list(&self.categories),
            source: self.source_url.map(|url| TitledLink {
                title: self.source_title,
                url,
            }),
            enclosures: decode_list(&self.enclosures),
            fetched_at: self.fetched_at,
        }
    }
}

/// Decode a JSON list column. Rows are only ever written by encode_list,
/// so a decode failure means outside tampering; an empty list is the safe
/// reading.
fn decode_list<T: serde::de::DeserializeOwned>(raw: &str) -> Vec<T> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encode an ordered list for a JSON text column.
pub(crate) fn encode_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}
