use feed_rs::model::{Entry, Feed};
use feed_rs::parser;

use super::types::{FeedEntry, FeedOptions};
use crate::util::html_to_text;

/// The parsed document as produced by `feed-rs`.
pub type FeedDocument = Feed;

/// Result of one parse attempt.
///
/// `feed-rs` either yields a document or an error, so "malformed" is simply the
/// error branch; its message is kept for the per-feed error record.
#[derive(Debug)]
pub enum ParseOutcome {
    WellFormed(Box<FeedDocument>),
    Malformed(String),
}

impl ParseOutcome {
    pub fn is_malformed(&self) -> bool {
        matches!(self, ParseOutcome::Malformed(_))
    }
}

/// Parses raw RSS/Atom/JSON Feed bytes.
pub fn parse(bytes: &[u8]) -> ParseOutcome {
    match parser::parse(bytes) {
        Ok(feed) => ParseOutcome::WellFormed(Box::new(feed)),
        Err(e) => ParseOutcome::Malformed(e.to_string()),
    }
}

/// Entries of one document that fall inside the run's date window.
#[derive(Debug, Default)]
pub struct Selection {
    pub entries: Vec<FeedEntry>,
    /// Channel logo (or icon) URL, shared by every article of the feed.
    pub channel_image: Option<String>,
    /// Entries dropped because they carried no usable date.
    pub undated: usize,
    /// True when the channel's own `updated` stamp predates the window.
    pub stale_channel: bool,
}

/// Picks the entries of `doc` that belong in this run.
///
/// - entry date is `published`, falling back to `updated`; undated entries are skipped
/// - entries outside `[start_date, end_date]` are skipped
/// - a channel whose `updated` stamp is older than `start_date` yields nothing
pub fn select_entries(doc: &FeedDocument, options: &FeedOptions) -> Selection {
    let channel_image = doc
        .logo
        .as_ref()
        .or(doc.icon.as_ref())
        .map(|img| img.uri.trim().to_string())
        .filter(|uri| !uri.is_empty());

    if let Some(updated) = doc.updated {
        if updated < options.start_date {
            return Selection {
                channel_image,
                stale_channel: true,
                ..Default::default()
            };
        }
    }

    let mut selection = Selection {
        channel_image,
        ..Default::default()
    };

    for entry in &doc.entries {
        let Some(published) = entry.published.or(entry.updated) else {
            selection.undated += 1;
            continue;
        };
        if !options.in_range(published) {
            continue;
        }
        selection.entries.push(to_feed_entry(entry, published));
    }

    selection
}

fn to_feed_entry(entry: &Entry, published: chrono::DateTime<chrono::Utc>) -> FeedEntry {
    let title = entry
        .title
        .as_ref()
        .map(|t| html_to_text(&t.content))
        .filter(|t| !t.is_empty());

    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty());

    let raw_description = entry
        .summary
        .as_ref()
        .map(|s| s.content.as_str())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.as_deref()))
        .unwrap_or("");

    let categories = entry
        .categories
        .iter()
        .map(|c| c.term.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    FeedEntry {
        title,
        link,
        description: html_to_text(raw_description),
        categories,
        published,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <image><url>https://example.com/logo.png</url><title>Example</title><link>https://example.com</link></image>
    <item>
        <title>Inside</title>
        <link>https://example.com/inside</link>
        <description>&lt;p&gt;Hello &lt;b&gt;world&lt;/b&gt;&lt;/p&gt;</description>
        <category>Security</category>
        <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>Too old</title>
        <link>https://example.com/old</link>
        <pubDate>Fri, 01 Dec 2023 10:00:00 GMT</pubDate>
    </item>
    <item>
        <title>No date</title>
        <link>https://example.com/undated</link>
    </item>
</channel></rss>"#;

    fn january() -> FeedOptions {
        FeedOptions::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
        )
    }

    fn well_formed(bytes: &[u8]) -> FeedDocument {
        match parse(bytes) {
            ParseOutcome::WellFormed(doc) => *doc,
            ParseOutcome::Malformed(e) => panic!("expected a document, got {e}"),
        }
    }

    #[test]
    fn test_parse_valid_rss() {
        assert!(!parse(RSS.as_bytes()).is_malformed());
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        assert!(parse(b"<not valid xml").is_malformed());
        assert!(parse(b"").is_malformed());
    }

    #[test]
    fn test_select_filters_by_date() {
        let doc = well_formed(RSS.as_bytes());
        let selection = select_entries(&doc, &january());

        assert_eq!(selection.entries.len(), 1);
        assert_eq!(selection.undated, 1);
        assert!(!selection.stale_channel);

        let entry = &selection.entries[0];
        assert_eq!(entry.title.as_deref(), Some("Inside"));
        assert_eq!(entry.link.as_deref(), Some("https://example.com/inside"));
        assert_eq!(entry.description, "Hello world");
        assert_eq!(entry.categories, vec!["Security".to_string()]);
    }

    #[test]
    fn test_channel_image_from_logo() {
        let doc = well_formed(RSS.as_bytes());
        let selection = select_entries(&doc, &january());
        assert_eq!(
            selection.channel_image.as_deref(),
            Some("https://example.com/logo.png")
        );
    }

    #[test]
    fn test_stale_channel_yields_nothing() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Stale</title>
  <id>urn:stale</id>
  <updated>2023-06-01T00:00:00Z</updated>
  <entry>
    <title>Fresh entry in stale channel</title>
    <id>urn:stale:1</id>
    <link href="https://example.com/1"/>
    <updated>2024-01-05T00:00:00Z</updated>
  </entry>
</feed>"#;
        let doc = well_formed(atom.as_bytes());
        let selection = select_entries(&doc, &january());
        assert!(selection.stale_channel);
        assert!(selection.entries.is_empty());
    }

    #[test]
    fn test_atom_updated_used_when_no_published() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title>
  <id>urn:atom</id>
  <updated>2024-01-10T00:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:atom:1</id>
    <link rel="alternate" href="https://example.com/a"/>
    <updated>2024-01-09T00:00:00Z</updated>
    <content type="html">&lt;p&gt;Body text&lt;/p&gt;</content>
  </entry>
</feed>"#;
        let doc = well_formed(atom.as_bytes());
        let selection = select_entries(&doc, &january());
        assert_eq!(selection.entries.len(), 1);
        assert_eq!(selection.entries[0].description, "Body text");
        assert_eq!(
            selection.entries[0].published,
            Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap()
        );
    }
}
