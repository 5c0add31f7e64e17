use crate::storage::{Article, Feed};

/// Outcome of reconciling an incoming entity against the stored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No record exists for the identity key; insert the incoming entity.
    Create,
    /// Replace every mutable field of the stored record with the incoming
    /// values and persist the full record.
    Update,
    /// Nothing to write.
    NoOp,
}

/// Decide what to do with a freshly parsed feed record.
///
/// An update is written only when *every* tracked field differs from the
/// stored record; if any field still matches, the incoming record is
/// discarded as a no-op. A fetch that changes a single field (a new
/// description, say) therefore does not trigger a write; only a wholesale
/// content change does. List fields compare by serialized value.
pub fn reconcile_feed(existing: Option<&Feed>, incoming: &Feed) -> Decision {
    let existing = match existing {
        None => return Decision::Create,
        Some(feed) => feed,
    };

    let any_equal = existing.title == incoming.title
        || existing.description == incoming.description
        || existing.link == incoming.link
        || existing.xml_url == incoming.xml_url
        || existing.published == incoming.published
        || existing.updated == incoming.updated
        || existing.author == incoming.author
        || existing.language == incoming.language
        || existing.image == incoming.image
        || existing.favicon == incoming.favicon
        || existing.copyright == incoming.copyright
        || existing.generator == incoming.generator
        || serialized(&existing.categories) == serialized(&incoming.categories)
        || existing.validator == incoming.validator;

    if any_equal {
        Decision::NoOp
    } else {
        Decision::Update
    }
}

/// Decide what to do with a freshly parsed article. Same rule as
/// [`reconcile_feed`]: update only when every tracked field differs.
pub fn reconcile_article(existing: Option<&Article>, incoming: &Article) -> Decision {
    let existing = match existing {
        None => return Decision::Create,
        Some(article) => article,
    };

    let any_equal = existing.title == incoming.title
        || existing.description == incoming.description
        || existing.link == incoming.link
        || existing.original_link == incoming.original_link
        || existing.published == incoming.published
        || existing.updated == incoming.updated
        || existing.author == incoming.author
        || existing.comments == incoming.comments
        || existing.image == incoming.image
        || serialized(&existing.categories) == serialized(&incoming.categories)
        || existing.source == incoming.source
        || serialized(&existing.enclosures) == serialized(&incoming.enclosures);

    if any_equal {
        Decision::NoOp
    } else {
        Decision::Update
    }
}

fn serialized<T: serde::Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Enclosure, TitledLink};
    use proptest::prelude::*;

    fn stored_feed() -> Feed {
        Feed {
            url: "https://example.com/feed.xml".to_string(),
            title: Some("Old Title".to_string()),
            description: Some("Old description".to_string()),
            link: Some("https://example.com".to_string()),
            xml_url: Some("https://example.com/feed.xml".to_string()),
            published: Some(1_700_000_000),
            updated: Some(1_700_000_100),
            author: Some("Old Author".to_string()),
            language: Some("en".to_string()),
            image: Some(TitledLink {
                title: Some("Logo".to_string()),
                url: "https://example.com/logo.png".to_string(),
            }),
            favicon: Some("https://example.com/favicon.ico".to_string()),
            copyright: Some("Copyright Old".to_string()),
            generator: Some("OldGen".to_string()),
            categories: vec!["old".to_string()],
            validator: Some("Mon, 01 Jan 2024 00:00:00 GMT".to_string()),
            fetched_at: Some(1_700_000_000),
        }
    }

    /// A feed whose every tracked field differs from `stored_feed()`.
    fn rewritten_feed() -> Feed {
        Feed {
            url: "https://example.com/feed.xml".to_string(),
            title: Some("New Title".to_string()),
            description: Some("New description".to_string()),
            link: Some("https://example.org".to_string()),
            xml_url: Some("https://example.org/feed.xml".to_string()),
            published: Some(1_800_000_000),
            updated: Some(1_800_000_100),
            author: Some("New Author".to_string()),
            language: Some("de".to_string()),
            image: Some(TitledLink {
                title: Some("New Logo".to_string()),
                url: "https://example.org/logo.png".to_string(),
            }),
            favicon: Some("https://example.org/favicon.ico".to_string()),
            copyright: Some("Copyright New".to_string()),
            generator: Some("NewGen".to_string()),
            categories: vec!["new".to_string()],
            validator: Some("Tue, 01 Jan 2025 00:00:00 GMT".to_string()),
            fetched_at: Some(1_800_000_000),
        }
    }

    fn stored_article() -> Article {
        Article {
            guid: "guid-1".to_string(),
            feed_url: "https://example.com/feed.xml".to_string(),
            title: Some("Old Title".to_string()),
            description: Some("Old description".to_string()),
            link: Some("https://example.com/1".to_string()),
            original_link: Some("https://origin.example.com/1".to_string()),
            published: Some(1_700_000_000),
            updated: Some(1_700_000_100),
            author: Some("Old Author".to_string()),
            comments: Some("https://example.com/1#comments".to_string()),
            image: Some(TitledLink {
                title: None,
                url: "https://example.com/1.png".to_string(),
            }),
            categories: vec!["old".to_string()],
            source: Some(TitledLink {
                title: Some("Source".to_string()),
                url: "https://source.example.com".to_string(),
            }),
            enclosures: vec![Enclosure {
                url: "https://example.com/1.mp3".to_string(),
                mime_type: Some("audio/mpeg".to_string()),
                length: Some(1024),
            }],
            fetched_at: Some(1_700_000_000),
        }
    }

    fn rewritten_article() -> Article {
        Article {
            guid: "guid-1".to_string(),
            feed_url: "https://example.com/feed.xml".to_string(),
            title: Some("New Title".to_string()),
            description: Some("New description".to_string()),
            link: Some("https://example.com/2".to_string()),
            original_link: Some("https://origin.example.com/2".to_string()),
            published: Some(1_800_000_000),
            updated: Some(1_800_000_100),
            author: Some("New Author".to_string()),
            comments: Some("https://example.com/2#comments".to_string()),
            image: Some(TitledLink {
                title: None,
                url: "https://example.com/2.png".to_string(),
            }),
            categories: vec!["new".to_string()],
            source: Some(TitledLink {
                title: Some("Other Source".to_string()),
                url: "https://source.example.org".to_string(),
            }),
            enclosures: vec![Enclosure {
                url: "https://example.com/2.mp3".to_string(),
                mime_type: Some("audio/ogg".to_string()),
                length: Some(2048),
            }],
            fetched_at: Some(1_800_000_000),
        }
    }

    #[test]
    fn create_when_no_existing_record() {
        assert_eq!(
            reconcile_feed(None, &rewritten_feed()),
            Decision::Create
        );
        assert_eq!(
            reconcile_article(None, &rewritten_article()),
            Decision::Create
        );
    }

    #[test]
    fn update_when_every_field_differs() {
        assert_eq!(
            reconcile_feed(Some(&stored_feed()), &rewritten_feed()),
            Decision::Update
        );
        assert_eq!(
            reconcile_article(Some(&stored_article()), &rewritten_article()),
            Decision::Update
        );
    }

    #[test]
    fn noop_when_identical() {
        assert_eq!(
            reconcile_feed(Some(&stored_feed()), &stored_feed()),
            Decision::NoOp
        );
        assert_eq!(
            reconcile_article(Some(&stored_article()), &stored_article()),
            Decision::NoOp
        );
    }

    // Regression: a lone changed description must NOT trigger an update.
    #[test]
    fn noop_when_only_description_changed() {
        let mut incoming = stored_feed();
        incoming.description = Some("A different description".to_string());
        assert_eq!(
            reconcile_feed(Some(&stored_feed()), &incoming),
            Decision::NoOp
        );

        let mut incoming = stored_article();
        incoming.description = Some("A different description".to_string());
        assert_eq!(
            reconcile_article(Some(&stored_article()), &incoming),
            Decision::NoOp
        );
    }

    #[test]
    fn noop_when_single_field_still_matches() {
        let mut incoming = rewritten_feed();
        incoming.language = stored_feed().language;
        assert_eq!(
            reconcile_feed(Some(&stored_feed()), &incoming),
            Decision::NoOp
        );
    }

    #[test]
    fn category_order_is_significant() {
        let mut existing = stored_feed();
        existing.categories = vec!["a".to_string(), "b".to_string()];
        let mut incoming = rewritten_feed();
        incoming.categories = vec!["b".to_string(), "a".to_string()];
        // Reordered list serializes differently, so the field counts as
        // changed and the update goes through.
        assert_eq!(
            reconcile_feed(Some(&existing), &incoming),
            Decision::Update
        );
    }

    proptest! {
        // Copying any non-empty subset of stored fields onto the rewritten
        // feed reintroduces at least one match, which must force NoOp.
        #[test]
        fn any_surviving_field_forces_noop(mask in 1u16..(1 << 14)) {
            let stored = stored_feed();
            let mut incoming = rewritten_feed();

            if mask & (1 << 0) != 0 { incoming.title = stored.title.clone(); }
            if mask & (1 << 1) != 0 { incoming.description = stored.description.clone(); }
            if mask & (1 << 2) != 0 { incoming.link = stored.link.clone(); }
            if mask & (1 << 3) != 0 { incoming.xml_url = stored.xml_url.clone(); }
            if mask & (1 << 4) != 0 { incoming.published = stored.published; }
            if mask & (1 << 5) != 0 { incoming.updated = stored.updated; }
            if mask & (1 << 6) != 0 { incoming.author = stored.author.clone(); }
            if mask & (1 << 7) != 0 { incoming.language = stored.language.clone(); }
            if mask & (1 << 8) != 0 { incoming.image = stored.image.clone(); }
            if mask & (1 << 9) != 0 { incoming.favicon = stored.favicon.clone(); }
            if mask & (1 << 10) != 0 { incoming.copyright = stored.copyright.clone(); }
            if mask & (1 << 11) != 0 { incoming.generator = stored.generator.clone(); }
            if mask & (1 << 12) != 0 { incoming.categories = stored.categories.clone(); }
            if mask & (1 << 13) != 0 { incoming.validator = stored.validator.clone(); }

            prop_assert_eq!(reconcile_feed(Some(&stored), &incoming), Decision::NoOp);
        }
    }
}
