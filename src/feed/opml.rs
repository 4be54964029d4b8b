use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::util::validate_feed_url;

/// SEC-003: Maximum allowed nesting depth for OPML outline elements.
/// Prevents stack overflow attacks from maliciously crafted deeply nested OPMLs.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that make the source list unusable. Fatal to the whole run.
#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("Source list not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read source list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// SEC-003: OPML nesting depth exceeds safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Source list contains no feeds")]
    NoFeeds,
}

impl From<quick_xml::Error> for SourceListError {
    fn from(e: quick_xml::Error) -> Self {
        SourceListError::XmlParse(e.to_string())
    }
}

/// One feed to retrieve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    /// Display title: the outline's `text`, then `title`, then the URL itself.
    pub title: String,
    pub url: String,
    /// `iconUrl` hint from the outline, used when the feed has no image of its own.
    pub icon_url: Option<String>,
}

/// Parsed source list: header metadata plus every feed outline.
///
/// The header fields come from the first outline in `<body>`, which by convention
/// is the folder describing the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceList {
    pub text: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub feeds: Vec<FeedSource>,
}

/// Loads and parses an OPML source list from disk.
///
/// # Errors
///
/// Missing file, unreadable or malformed XML, and a list without a single usable
/// feed all produce a [`SourceListError`].
///
/// # Security
///
/// XXE is mitigated because `quick-xml` (0.37) does not parse `<!ENTITY>`
/// declarations; see SEC-002 in [`parse_source_list`].
pub async fn load(path: &Path) -> Result<SourceList, SourceListError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SourceListError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(SourceListError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let list = parse_source_list(&content)?;
    tracing::info!(path = %path.display(), feeds = list.feeds.len(), "Loaded source list");
    Ok(list)
}

/// Parses OPML content into a [`SourceList`].
///
/// Feeds are collected from any `<outline>` with an `xmlUrl`, regardless of
/// nesting. Outlines whose URL is not http(s) are skipped with a warning.
pub fn parse_source_list(content: &str) -> Result<SourceList, SourceListError> {
    // SEC-002: XXE protection. quick-xml (0.37) never parses <!ENTITY> declarations from
    // DOCTYPE; `decode_and_unescape_value()` only resolves the 5 XML builtins and
    // reports custom entities like &xxe; as an error.
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut list = SourceList::default();
    let mut seen_header = false;
    let mut buf = Vec::new();
    // SEC-003: Track nesting depth to prevent stack overflow from malicious OPMLs
    let mut depth: usize = 0;

    loop {
        let (element, opens) = match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => (e.into_owned(), true),
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => (e.into_owned(), false),
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
                buf.clear();
                continue;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {
                buf.clear();
                continue;
            }
        };

        if opens {
            depth += 1;
            if depth > MAX_OPML_DEPTH {
                return Err(SourceListError::MaxDepthExceeded(MAX_OPML_DEPTH));
            }
        }

        let outline = read_outline(&element, &reader)?;
        if !seen_header {
            seen_header = true;
            list.text = outline.text.clone();
            list.title = outline.title.clone();
            list.category = outline.category.clone();
        }
        if let Some(feed) = outline.into_source() {
            list.feeds.push(feed);
        }
        buf.clear();
    }

    if list.feeds.is_empty() {
        return Err(SourceListError::NoFeeds);
    }
    Ok(list)
}

#[derive(Debug, Default)]
struct Outline {
    text: Option<String>,
    title: Option<String>,
    category: Option<String>,
    xml_url: Option<String>,
    icon_url: Option<String>,
}

impl Outline {
    fn into_source(self) -> Option<FeedSource> {
        let url = self.xml_url?.trim().to_string();
        if let Err(e) = validate_feed_url(&url) {
            tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL");
            return None;
        }

        let title = self
            .text
            .or(self.title)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.clone());
        let icon_url = self.icon_url.filter(|icon| validate_feed_url(icon).is_ok());

        Some(FeedSource {
            title,
            url,
            icon_url,
        })
    }
}

fn read_outline(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<Outline, SourceListError> {
    let mut outline = Outline::default();
    let decoder = reader.decoder();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let slot = match attr.key.as_ref() {
            b"text" => &mut outline.text,
            b"title" => &mut outline.title,
            b"category" => &mut outline.category,
            b"xmlUrl" => &mut outline.xml_url,
            b"iconUrl" => &mut outline.icon_url,
            _ => continue,
        };
        *slot = Some(attr.decode_and_unescape_value(decoder)?.into_owned());
    }

    Ok(outline)
}
