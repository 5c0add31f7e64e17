use anyhow::Result;
use feed_rs::parser;
use sha2::{Digest, Sha256};

use crate::storage::{Enclosure, TitledLink};

/// Feed-level metadata parsed from a document.
#[derive(Debug, Clone)]
pub struct ParsedMeta {
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
}

/// One article parsed from a feed document. Carries no owning-feed
/// reference; the caller attaches the subscription URL.
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub guid: String,
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
}

/// One event in the parse stream. A document yields at most one Meta,
/// zero or more Articles, and a Fault for each entry that could not be
/// mapped. Events are independent: a Fault does not invalidate siblings.
#[derive(Debug)]
pub enum FeedEvent {
    Meta(ParsedMeta),
    Article(ParsedArticle),
    Fault(String),
}

/// Parse a fetched body into an ordered, finite event sequence.
///
/// Returns Err only when the document as a whole is not parseable as RSS
/// or Atom; per-entry problems surface as interleaved [`FeedEvent::Fault`]
/// events instead.
pub fn parse_events(bytes: &[u8]) -> Result<Vec<FeedEvent>> {
    let feed = parser::parse(bytes)?;

    let mut events = Vec::with_capacity(feed.entries.len() + 1);

    events.push(FeedEvent::Meta(ParsedMeta {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|d| d.content),
        link: feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() != Some("self"))
            .map(|l| l.href.clone()),
        xml_url: feed
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("self"))
            .map(|l| l.href.clone()),
        published: feed.published.map(|dt| dt.timestamp()),
        updated: feed.updated.map(|dt| dt.timestamp()),
        author: feed.authors.into_iter().next().map(|p| p.name),
        language: feed.language,
        image: feed.logo.map(|img| TitledLink {
            title: img.title,
            url: img.uri,
        }),
        favicon: feed.icon.map(|img| img.uri),
        copyright: feed.rights.map(|r| r.content),
        generator: feed.generator.map(|g| g.content),
        categories: feed.categories.into_iter().map(|c| c.term).collect(),
    }));

    for entry in feed.entries {
        events.push(map_entry(entry));
    }

    Ok(events)
}

fn map_entry(entry: feed_rs::model::Entry) -> FeedEvent {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.is_none() || l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());
    let title = entry.title.map(|t| t.content);
    let published = entry.published.map(|dt| dt.timestamp());

    // An entry with no id, no link and no title has nothing to derive an
    // identity from; it cannot be reconciled against the store.
    if entry.id.is_empty() && link.is_none() && title.is_none() {
        return FeedEvent::Fault("entry has no id, link or title".to_string());
    }

    let existing_id = if entry.id.is_empty() {
        None
    } else {
        Some(entry.id.as_str())
    };
    let guid = generate_guid(existing_id, link.as_deref(), title.as_deref(), published);

    let enclosures: Vec<Enclosure> = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| {
            c.url.as_ref().map(|url| Enclosure {
                url: url.to_string(),
                mime_type: c.content_type.as_ref().map(|m| m.to_string()),
                length: c.size.map(|s| s as i64),
            })
        })
        .collect();

    let image = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .next()
        .map(|thumb| TitledLink {
            title: thumb.image.title.clone(),
            url: thumb.image.uri.clone(),
        });

    FeedEvent::Article(ParsedArticle {
        guid,
        title,
        description: entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body)),
        link,
        original_link: entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("related"))
            .map(|l| l.href.clone()),
        published,
        updated: entry.updated.map(|dt| dt.timestamp()),
        author: entry.authors.into_iter().next().map(|p| p.name),
        comments: entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("replies"))
            .map(|l| l.href.clone()),
        image,
        categories: entry.categories.into_iter().map(|c| c.term).collect(),
        source: entry.source.map(|url| TitledLink { title: None, url }),
        enclosures,
    })
}

fn generate_guid(
    existing: Option<&str>,
    url: Option<&str>,
    title: Option<&str>,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        url.unwrap_or(""),
        title.unwrap_or(""),
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
