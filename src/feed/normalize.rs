use super::types::{Article, FeedOptions};
use crate::util::{strip_control_chars, truncate_at_word, truncate_chars};

/// Character bounds applied to every article field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub title: usize,
    pub link: usize,
    pub feed_url: usize,
    pub channel_image: usize,
    pub skipped_reason: usize,
    pub description: usize,
}

impl FieldLimits {
    pub fn new(max_description_length: usize) -> Self {
        Self {
            title: 100,
            link: 200,
            feed_url: 200,
            channel_image: 200,
            skipped_reason: 500,
            description: max_description_length,
        }
    }
}

impl From<&FeedOptions> for FieldLimits {
    fn from(options: &FeedOptions) -> Self {
        Self::new(options.max_description_length)
    }
}

/// Trims, sanitizes and bounds every field of `article`.
///
/// Prose fields (title, description, skip reason) are cut at a word boundary with
/// `...` appended; URL fields are hard-cut.
pub fn normalize(article: Article, limits: &FieldLimits) -> Article {
    Article {
        feed_title: prose(&article.feed_title, limits.title),
        feed_url: url(&article.feed_url, limits.feed_url),
        title: prose(&article.title, limits.title),
        link: url(&article.link, limits.link),
        description: prose(&article.description, limits.description),
        published: article.published,
        channel_image: article
            .channel_image
            .as_deref()
            .map(|img| url(img, limits.channel_image))
            .filter(|img| !img.is_empty()),
        skipped_reason: article
            .skipped_reason
            .as_deref()
            .map(|reason| prose(reason, limits.skipped_reason)),
    }
}

fn prose(value: &str, max_chars: usize) -> String {
    let clean = strip_control_chars(value);
    truncate_at_word(clean.trim(), max_chars).into_owned()
}

fn url(value: &str, max_chars: usize) -> String {
    truncate_chars(value.trim(), max_chars).to_string()
}
