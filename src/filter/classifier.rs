use thiserror::Error;

use crate::feed::{Article, FeedEntry, FeedOptions, FeedOrigin};

/// Reason recorded when the aggressive-inclusion check fails.
pub const NO_AGGRESSIVE_MATCH: &str = "No aggressive keyword matched";

/// Title given to entries that only carry a link.
pub const UNTITLED: &str = "No title";

/// Per-entry data problems. Never fatal: the entry is rejected with the error as reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("entry has neither a title nor a link")]
    MissingTitleAndLink,
}

/// Outcome of the two editorial checks for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

/// Runs the exclusion and aggressive-inclusion checks.
///
/// Both checks are evaluated; when both fail, the aggressive failure is the
/// recorded reason.
///
/// # Errors
///
/// [`ClassificationError`] when the entry lacks the fields an article needs.
pub fn verdict(entry: &FeedEntry, options: &FeedOptions) -> Result<Verdict, ClassificationError> {
    if entry.title.is_none() && entry.link.is_none() {
        return Err(ClassificationError::MissingTitleAndLink);
    }

    let text = combined_text(entry);
    let excluded_by = matched_exclusion(&text, options);
    let aggressive_ok = passes_aggressive(entry, &text, options);

    Ok(match (aggressive_ok, excluded_by) {
        (false, _) => Verdict::Rejected(NO_AGGRESSIVE_MATCH.to_string()),
        (true, Some(keyword)) => Verdict::Rejected(format!("Matched keyword: {keyword}")),
        (true, None) => Verdict::Accepted,
    })
}

/// Turns an entry into an [`Article`], accepted or carrying a skip reason.
pub fn classify(entry: FeedEntry, origin: &FeedOrigin, options: &FeedOptions) -> Article {
    let skipped_reason = match verdict(&entry, options) {
        Ok(Verdict::Accepted) => None,
        Ok(Verdict::Rejected(reason)) => Some(reason),
        Err(e) => {
            tracing::debug!(feed = %origin.feed_url, error = %e, "Skipping malformed entry");
            Some(format!("Malformed entry: {e}"))
        }
    };

    Article {
        feed_title: origin.feed_title.clone(),
        feed_url: origin.feed_url.clone(),
        title: entry.title.unwrap_or_else(|| UNTITLED.to_string()),
        link: entry.link.unwrap_or_default(),
        description: entry.description,
        published: entry.published,
        channel_image: origin.channel_image.clone(),
        skipped_reason,
    }
}

/// Lowercased title, categories and description joined by spaces.
fn combined_text(entry: &FeedEntry) -> String {
    let mut text = String::with_capacity(entry.description.len() + 128);
    if let Some(title) = &entry.title {
        text.push_str(title);
    }
    for category in &entry.categories {
        text.push(' ');
        text.push_str(category);
    }
    text.push(' ');
    text.push_str(&entry.description);
    text.to_lowercase()
}

/// First exclusion keyword present in `text` that no exception phrase vetoes.
///
/// Keywords and exception keys are compared case-insensitively; the returned
/// keyword is lowercased.
fn matched_exclusion(text: &str, options: &FeedOptions) -> Option<String> {
    options
        .exclude_keywords
        .iter()
        .map(|keyword| keyword.to_lowercase())
        .filter(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
        .find(|keyword| !vetoed(keyword, text, options))
}

fn vetoed(keyword: &str, text: &str, options: &FeedOptions) -> bool {
    options
        .keyword_exceptions
        .iter()
        .filter(|(key, _)| key.to_lowercase() == keyword)
        .flat_map(|(_, phrases)| phrases)
        .any(|phrase| text.contains(&phrase.to_lowercase()))
}

fn passes_aggressive(entry: &FeedEntry, text: &str, options: &FeedOptions) -> bool {
    if options.aggressive_keywords.is_empty() {
        return true;
    }
    options.aggressive_keywords.iter().any(|keyword| {
        let keyword = keyword.to_lowercase();
        entry
            .categories
            .iter()
            .any(|tag| tag.to_lowercase() == keyword)
            || text.contains(keyword.as_str())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::keywords::default_exceptions;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn entry(title: &str, description: &str, categories: &[&str]) -> FeedEntry {
        FeedEntry {
            title: Some(title.to_string()),
            link: Some("https://example.com/a".to_string()),
            description: description.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            published: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        }
    }

    fn origin() -> FeedOrigin {
        FeedOrigin {
            feed_title: "Example".into(),
            feed_url: "https://example.com/rss".into(),
            channel_image: Some("https://example.com/logo.png".into()),
        }
    }

    fn options(exclude: &[&str], aggressive: &[&str]) -> FeedOptions {
        let now = Utc::now();
        let mut opts = FeedOptions::new(now, now);
        opts.exclude_keywords = exclude.iter().map(|k| k.to_string()).collect();
        opts.aggressive_keywords = aggressive.iter().map(|k| k.to_string()).collect();
        opts.keyword_exceptions = default_exceptions();
        opts
    }

    #[test]
    fn test_exception_phrase_vetoes_exclusion() {
        let opts = options(&["sponsored"], &[]);
        let e = entry("State-sponsored actors target routers", "", &[]);
        assert_eq!(verdict(&e, &opts), Ok(Verdict::Accepted));
    }

    #[test]
    fn test_excluded_keyword_recorded_in_reason() {
        let opts = options(&["sponsored"], &[]);
        let e = entry("This is a sponsored post", "", &[]);
        assert_eq!(
            verdict(&e, &opts),
            Ok(Verdict::Rejected("Matched keyword: sponsored".into()))
        );
    }

    #[test]
    fn test_exclusion_checks_categories_and_description() {
        let opts = options(&["giveaway"], &[]);
        assert!(matches!(
            verdict(&entry("Plain", "", &["Giveaway"]), &opts),
            Ok(Verdict::Rejected(_))
        ));
        assert!(matches!(
            verdict(&entry("Plain", "Enter our GIVEAWAY now", &[]), &opts),
            Ok(Verdict::Rejected(_))
        ));
    }

    #[test]
    fn test_first_keyword_is_lexicographic() {
        let opts = options(&["sponsored", "advertisement"], &[]);
        let e = entry("sponsored advertisement", "", &[]);
        assert_eq!(
            verdict(&e, &opts),
            Ok(Verdict::Rejected("Matched keyword: advertisement".into()))
        );
    }

    #[test]
    fn test_aggressive_requires_keyword() {
        let e = entry("New phone released", "Faster chip", &["Gadgets"]);
        assert_eq!(
            verdict(&e, &options(&[], &["security"])),
            Ok(Verdict::Rejected(NO_AGGRESSIVE_MATCH.into()))
        );
        assert_eq!(verdict(&e, &options(&[], &[])), Ok(Verdict::Accepted));
    }

    #[test]
    fn test_aggressive_matches_tag_or_text() {
        let opts = options(&[], &["security"]);
        assert_eq!(
            verdict(&entry("Patch Tuesday", "", &["Security"]), &opts),
            Ok(Verdict::Accepted)
        );
        assert_eq!(
            verdict(&entry("Patch Tuesday", "Important SECURITY fixes", &[]), &opts),
            Ok(Verdict::Accepted)
        );
    }

    #[test]
    fn test_aggressive_failure_takes_precedence() {
        let opts = options(&["sponsored"], &["security"]);
        let e = entry("A sponsored post about phones", "", &[]);
        assert_eq!(
            verdict(&e, &opts),
            Ok(Verdict::Rejected(NO_AGGRESSIVE_MATCH.into()))
        );
    }

    #[test]
    fn test_missing_title_and_link_is_malformed() {
        let mut e = entry("x", "", &[]);
        e.title = None;
        e.link = None;
        let opts = options(&[], &[]);
        assert_eq!(verdict(&e, &opts), Err(ClassificationError::MissingTitleAndLink));

        let article = classify(e, &origin(), &opts);
        assert!(article.is_rejected());
        assert!(article
            .skipped_reason
            .as_deref()
            .unwrap()
            .starts_with("Malformed entry:"));
    }

    #[test]
    fn test_keywords_match_regardless_of_case() {
        let e = entry("This is a Sponsored post about Security", "", &["Zero-Day"]);
        assert_eq!(
            verdict(&e, &options(&["Sponsored"], &[])),
            Ok(Verdict::Rejected("Matched keyword: sponsored".into()))
        );
        assert_eq!(verdict(&e, &options(&[], &["SECURITY"])), Ok(Verdict::Accepted));
        assert_eq!(verdict(&e, &options(&[], &["zero-day"])), Ok(Verdict::Accepted));

        let mut opts = options(&["SPONSORED"], &[]);
        opts.keyword_exceptions = [("Sponsored".to_string(), vec!["State-Sponsored".to_string()])].into();
        let state = entry("STATE-SPONSORED crews return", "", &[]);
        assert_eq!(verdict(&state, &opts), Ok(Verdict::Accepted));
    }

    #[test]
    fn test_entry_without_title_gets_placeholder() {
        let mut e = entry("x", "", &[]);
        e.title = None;
        let article = classify(e, &origin(), &options(&[], &[]));
        assert_eq!(article.title, UNTITLED);
        assert!(!article.is_rejected());
    }

    #[test]
    fn test_classify_copies_origin() {
        let article = classify(entry("Hello", "Body", &[]), &origin(), &options(&[], &[]));
        assert!(!article.is_rejected());
        assert_eq!(article.feed_title, "Example");
        assert_eq!(article.feed_url, "https://example.com/rss");
        assert_eq!(article.channel_image.as_deref(), Some("https://example.com/logo.png"));
        assert_eq!(article.description, "Body");
    }

    fn words() -> impl Strategy<Value = String> {
        proptest::collection::vec(
            prop::sample::select(vec!["ad", "sec", "news", "state-ad", "cat", "dog"]),
            0..8,
        )
        .prop_map(|w| w.join(" "))
    }

    proptest! {
        #[test]
        fn prop_no_keywords_accepts_everything(title in words(), description in words()) {
            let e = entry(&format!("t {title}"), &description, &[]);
            prop_assert_eq!(verdict(&e, &options(&[], &[])), Ok(Verdict::Accepted));
        }

        #[test]
        fn prop_exceptions_never_reject_more(title in words(), description in words()) {
            let e = entry(&format!("t {title}"), &description, &[]);
            let mut without = options(&["ad"], &["sec"]);
            without.keyword_exceptions.clear();
            let mut with = without.clone();
            with.keyword_exceptions.insert("ad".into(), vec!["state-ad".into()]);

            if verdict(&e, &without) == Ok(Verdict::Accepted) {
                prop_assert_eq!(verdict(&e, &with), Ok(Verdict::Accepted));
            }
        }

        #[test]
        fn prop_accepted_has_no_unvetoed_keyword(title in words(), description in words()) {
            let e = entry(&format!("t {title}"), &description, &[]);
            let opts = options(&["ad"], &[]);
            let article = classify(e, &origin(), &opts);
            let text = format!("{} {}", article.title, article.description);
            if !article.is_rejected() {
                prop_assert!(!text.split_whitespace().any(|w| w == "ad"));
            }
            prop_assert_eq!(article.is_rejected(), article.skipped_reason.is_some());
        }
    }
}
