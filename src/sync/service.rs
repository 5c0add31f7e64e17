use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::feed::{
    fetch, parse_events, prepare_request, FeedEvent, FetchError, FetchOutcome, ParsedArticle,
    ParsedMeta,
};
use crate::storage::{Article, Database, Feed};
use crate::sync::detect::{reconcile_article, reconcile_feed, Decision};

/// Result of refreshing a single feed during a bulk refresh.
pub struct RefreshResult {
    pub url: String,
    pub result: Result<(), FetchError>,
}

/// Drives feed refresh cycles end-to-end: conditional fetch, event-stream
/// parse, per-entity reconciliation against the store, and the minimal
/// necessary writes.
///
/// Cycles for different feeds are fully independent; a failure in one is
/// reported and never propagates to another. All coordination happens
/// through the store, so overlapping refreshes of the same feed are safe
/// (writes are idempotent whole-record saves).
#[derive(Clone)]
pub struct FeedSync {
    db: Database,
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedSync {
    pub fn new(db: Database, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            db,
            client,
            timeout,
        }
    }

    /// Subscribe to a feed URL and run its first refresh cycle.
    ///
    /// Idempotent: if the URL is already stored this logs and skips. A
    /// count above one can only mean the unique key was violated and is
    /// reported as an integrity fault.
    pub async fn add_feed(&self, url: &str) -> Result<(), FetchError> {
        let url = validate_feed_url(url)?;

        let count = self
            .db
            .count_feeds_with_url(&url)
            .await
            .map_err(storage_fault)?;

        match count {
            0 => {
                tracing::debug!(feed = %url, "Adding new feed");
                self.refresh_feed(&url).await
            }
            1 => {
                tracing::debug!(feed = %url, "Feed already subscribed, skipping");
                Ok(())
            }
            n => {
                tracing::error!(feed = %url, count = n, "Duplicate feed records for unique URL");
                Err(FetchError::Integrity(format!(
                    "{} feed records share the url {}",
                    n, url
                )))
            }
        }
    }

    /// Run one refresh cycle for one feed: prepare the conditional request,
    /// fetch, and either short-circuit on 304 or stream the parsed events
    /// through reconciliation.
    pub async fn refresh_feed(&self, url: &str) -> Result<(), FetchError> {
        let stored = self.db.find_feed(url).await.map_err(storage_fault)?;

        let request = prepare_request(
            url,
            stored.as_ref().and_then(|f| f.validator.as_deref()),
            self.timeout,
        );

        match fetch(&self.client, &request).await? {
            FetchOutcome::NotModified => {
                tracing::debug!(feed = %url, "Feed not modified, skipping");
                Ok(())
            }
            FetchOutcome::Fetched { body, validator } => {
                self.apply_events(url, stored, &body, validator).await
            }
        }
    }

    /// Reconcile and apply every event parsed from a fetched body.
    ///
    /// Events are independent: a fault event or a failed save is reported
    /// and the remaining events still run. Only a document that cannot be
    /// parsed at all aborts the cycle.
    async fn apply_events(
        &self,
        url: &str,
        stored: Option<Feed>,
        body: &[u8],
        validator: Option<String>,
    ) -> Result<(), FetchError> {
        let events = parse_events(body).map_err(|e| FetchError::Parse(e.to_string()))?;
        let now = Utc::now().timestamp();

        for event in events {
            match event {
                FeedEvent::Meta(meta) => {
                    let incoming = feed_record(url, meta, validator.clone(), now);
                    match reconcile_feed(stored.as_ref(), &incoming) {
                        Decision::NoOp => {
                            tracing::debug!(feed = %url, "Feed metadata unchanged");
                        }
                        decision => {
                            tracing::debug!(feed = %url, ?decision, "Saving feed metadata");
                            if let Err(e) = self.db.save_feed(&incoming).await {
                                tracing::error!(feed = %url, error = %e, "Failed to save feed metadata");
                            }
                        }
                    }
                }
                FeedEvent::Article(parsed) => {
                    let incoming = article_record(url, parsed, now);
                    let existing = match self.db.find_article(&incoming.guid, url).await {
                        Ok(existing) => existing,
                        Err(e) => {
                            tracing::error!(feed = %url, guid = %incoming.guid, error = %e, "Failed to look up article");
                            continue;
                        }
                    };
                    match reconcile_article(existing.as_ref(), &incoming) {
                        Decision::NoOp => {}
                        decision => {
                            tracing::debug!(feed = %url, guid = %incoming.guid, ?decision, "Saving article");
                            if let Err(e) = self.db.save_article(&incoming).await {
                                tracing::error!(feed = %url, guid = %incoming.guid, error = %e, "Failed to save article");
                            }
                        }
                    }
                }
                FeedEvent::Fault(reason) => {
                    tracing::warn!(feed = %url, reason = %reason, "Skipping unusable feed entry");
                }
            }
        }

        Ok(())
    }

    /// Refresh every stored feed. Cycles run concurrently with bounded
    /// parallelism; each feed's outcome is isolated and reported on its
    /// own, so one failure never blocks the rest.
    pub async fn refresh_all(&self) -> Result<Vec<RefreshResult>, FetchError> {
        let feeds = self.db.all_feeds().await.map_err(storage_fault)?;
        if feeds.is_empty() {
            return Ok(Vec::new());
        }

        let results: Vec<RefreshResult> = stream::iter(feeds.into_iter())
            .map(|feed| {
                let sync = self.clone();
                async move {
                    let result = sync.refresh_feed(&feed.url).await;
                    if let Err(e) = &result {
                        tracing::error!(feed = %feed.url, error = %e, "Feed refresh failed");
                    }
                    RefreshResult {
                        url: feed.url,
                        result,
                    }
                }
            })
            .buffer_unordered(10) // Max 10 concurrent fetches
            .collect()
            .await;

        Ok(results)
    }

    /// Remove a feed by URL, then cascade-remove every article that
    /// references it. A URL with no stored feed is a warning, not an error.
    pub async fn remove_feed(&self, url: &str) -> Result<(), FetchError> {
        let removed = self.db.delete_feed(url).await.map_err(storage_fault)?;
        if !removed {
            tracing::warn!(feed = %url, "Feed not found, nothing to remove");
            return Ok(());
        }

        let articles = self
            .db
            .delete_articles_for_feed(url)
            .await
            .map_err(storage_fault)?;
        tracing::debug!(feed = %url, articles = articles, "Removed feed and its articles");
        Ok(())
    }

    /// Bulk-remove articles whose published date is more than `days` days
    /// old. Returns the number of articles removed.
    pub async fn remove_articles_older_than(&self, days: i64) -> Result<u64, FetchError> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).timestamp();
        let removed = self
            .db
            .delete_articles_older_than(cutoff)
            .await
            .map_err(storage_fault)?;
        tracing::debug!(days = days, removed = removed, "Pruned old articles");
        Ok(removed)
    }

    /// Find articles matching a keyword against title, description or
    /// author (case-insensitive), capped at `limit` results.
    pub async fn articles_by_keyword(
        &self,
        keyword: &str,
        limit: i64,
    ) -> Result<Vec<Article>, FetchError> {
        self.db
            .articles_matching_keyword(keyword, limit)
            .await
            .map_err(storage_fault)
    }

    /// Find articles matching ANY of the keywords, capped at `limit`.
    pub async fn articles_by_keywords<S: AsRef<str>>(
        &self,
        keywords: &[S],
        limit: i64,
    ) -> Result<Vec<Article>, FetchError> {
        self.db
            .articles_matching_keywords(keywords, limit)
            .await
            .map_err(storage_fault)
    }
}

// ============================================================================
// Periodic Refresh
// ============================================================================

/// Owned handle for the periodic bulk refresh.
///
/// Each handle drives at most one timer: starting while one is running is
/// a warn-level no-op, stopping an idle handle does nothing. Two service
/// instances in one process each own their own handle and do not collide.
pub struct RefreshScheduler {
    sync: FeedSync,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(sync: FeedSync) -> Self {
        Self {
            sync,
            handle: Mutex::new(None),
        }
    }

    /// Start refreshing all feeds every `period`. The first cycle runs one
    /// full period after start, not immediately.
    pub fn start(&self, period: Duration) {
        let mut guard = self.handle.lock().expect("scheduler lock poisoned");

        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                tracing::warn!("Periodic refresh already running, ignoring start");
                return;
            }
        }

        let sync = self.sync.clone();
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                tracing::debug!("Periodic refresh tick");
                if let Err(e) = sync.refresh_all().await {
                    tracing::error!(error = %e, "Periodic refresh failed");
                }
            }
        }));
        tracing::debug!(period_secs = period.as_secs(), "Periodic refresh started");
    }

    /// Stop the periodic refresh. A handle with no active timer is left
    /// untouched.
    pub fn stop(&self) {
        let mut guard = self.handle.lock().expect("scheduler lock poisoned");
        match guard.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Periodic refresh stopped");
            }
            None => {
                tracing::debug!("No periodic refresh running");
            }
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse and normalize a feed URL, rejecting anything that is not a
/// fetchable http(s) URL with a host.
fn validate_feed_url(raw: &str) -> Result<String, FetchError> {
    let url =
        url::Url::parse(raw).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme {} (only http/https)",
                scheme
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(FetchError::InvalidUrl(format!("{} has no host", raw)));
    }

    Ok(url.to_string())
}

fn storage_fault(e: anyhow::Error) -> FetchError {
    FetchError::Storage(e.to_string())
}

/// Build the incoming feed record for reconciliation: parsed metadata plus
/// the identity URL, the response validator, and the cycle timestamp.
fn feed_record(url: &str, meta: ParsedMeta, validator: Option<String>, now: i64) -> Feed {
    Feed {
        url: url.to_string(),
        title: meta.title,
        description: meta.description,
        link: meta.link,
        xml_url: meta.xml_url,
        published: meta.published,
        updated: meta.updated,
        author: meta.author,
        language: meta.language,
        image: meta.image,
        favicon: meta.favicon,
        copyright: meta.copyright,
        generator: meta.generator,
        categories: meta.categories,
        validator,
        fetched_at: Some(now),
    }
}

/// Build the incoming article record: parsed fields plus the owning feed's
/// URL and the cycle timestamp.
fn article_record(feed_url: &str, parsed: ParsedArticle, now: i64) -> Article {
    Article {
        guid: parsed.guid,
        feed_url: feed_url.to_string(),
        title: parsed.title,
        description: parsed.description,
        link: parsed.link,
        original_link: parsed.original_link,
        published: parsed.published,
        updated: parsed.updated,
        author: parsed.author,
        comments: parsed.comments,
        image: parsed.image,
        categories: parsed.categories,
        source: parsed.source,
        enclosures: parsed.enclosures,
        fetched_at: Some(now),
    }
}
