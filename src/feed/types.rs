use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default ceiling on concurrently processed feeds.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 15;
/// Default freshness window for the cheap cache path (10 minutes).
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(600);
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How the final article lists are ordered after collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    /// Publication date, oldest first.
    #[default]
    Date,
    /// Feed title, then publication date.
    Feed,
}

/// Fully resolved options for one run.
///
/// Immutable once built; every feed task borrows the same instance.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// Maximum description length in characters (> 0).
    pub max_description_length: usize,
    /// Lowercased exclusion keywords. Ordered so "first match" is deterministic.
    pub exclude_keywords: BTreeSet<String>,
    /// Per-keyword exception phrases that veto an exclusion.
    pub keyword_exceptions: BTreeMap<String, Vec<String>>,
    /// Lowercased aggressive-inclusion keywords; empty disables the check.
    pub aggressive_keywords: BTreeSet<String>,
    /// Never read from or write to the cache.
    pub ignore_cache: bool,
    /// Skip conditional requests; serve fresh cache entries without touching the network.
    pub no_conditional_cache: bool,
    pub cache_max_age: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_tasks: usize,
    pub order_by: OrderBy,
}

impl FeedOptions {
    /// Options covering `[start_date, end_date]` with every other knob at its default.
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            end_date,
            max_description_length: 200,
            exclude_keywords: BTreeSet::new(),
            keyword_exceptions: BTreeMap::new(),
            aggressive_keywords: BTreeSet::new(),
            ignore_cache: false,
            no_conditional_cache: true,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            order_by: OrderBy::Date,
        }
    }

    pub fn in_range(&self, ts: DateTime<Utc>) -> bool {
        self.start_date <= ts && ts <= self.end_date
    }

    /// Whether conditional revalidation headers should be sent and stored.
    pub fn conditional_requests(&self) -> bool {
        !self.ignore_cache && !self.no_conditional_cache
    }
}

/// A candidate entry that passed date selection, ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    /// Full plain-text description (not yet truncated).
    pub description: String,
    /// Category / tag terms.
    pub categories: Vec<String>,
    pub published: DateTime<Utc>,
}

/// Per-feed fields copied onto every article of that feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOrigin {
    pub feed_title: String,
    pub feed_url: String,
    /// Channel logo or icon, else the source list's icon hint.
    pub channel_image: Option<String>,
}

/// A normalized article record handed to report writers.
///
/// `skipped_reason` is set iff the article was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub feed_title: String,
    pub feed_url: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub published: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

impl Article {
    pub fn is_rejected(&self) -> bool {
        self.skipped_reason.is_some()
    }
}

/// One feed that produced no articles because its fetch chain failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedFailure {
    pub feed_title: String,
    pub feed_url: String,
    pub cause: String,
}

/// Aggregated outcome of a scheduler run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunResult {
    pub accepted: Vec<Article>,
    pub rejected: Vec<Article>,
    pub errors: Vec<FeedFailure>,
}

impl RunResult {
    /// Applies the final ordering to both article lists and the error list.
    pub fn sort(&mut self, order: OrderBy) {
        let key = |a: &Article, b: &Article| match order {
            OrderBy::Date => a
                .published
                .cmp(&b.published)
                .then_with(|| a.feed_title.cmp(&b.feed_title))
                .then_with(|| a.title.cmp(&b.title)),
            OrderBy::Feed => a
                .feed_title
                .cmp(&b.feed_title)
                .then_with(|| a.published.cmp(&b.published))
                .then_with(|| a.title.cmp(&b.title)),
        };
        self.accepted.sort_by(key);
        self.rejected.sort_by(key);
        self.errors.sort_by(|a, b| a.feed_title.cmp(&b.feed_title));
    }
}
