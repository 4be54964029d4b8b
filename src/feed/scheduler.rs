use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::fallback::acquire;
use super::fetcher::{RetrievalError, Retriever};
use super::normalize::{normalize, FieldLimits};
use super::opml::FeedSource;
use super::parser::select_entries;
use super::types::{Article, FeedFailure, FeedOptions, FeedOrigin, RunResult};
use crate::filter::classify;

/// Articles produced by one feed, already split by verdict.
#[derive(Debug, Default)]
struct FeedArticles {
    accepted: Vec<Article>,
    rejected: Vec<Article>,
}

/// Retrieves, parses and classifies every source, at most
/// `options.max_concurrent_tasks` at a time.
///
/// Each feed runs in its own task; an error or panic in one feed becomes a
/// [`FeedFailure`] and never disturbs its siblings. Returns once every task has
/// finished, with the lists sorted per `options.order_by`.
pub async fn run(retriever: &Retriever, sources: Vec<FeedSource>, options: &FeedOptions) -> RunResult {
    let sources = prepare_sources(sources);
    if sources.is_empty() {
        return RunResult::default();
    }

    let total = sources.len();
    let completed = Arc::new(AtomicUsize::new(0));
    let options = Arc::new(options.clone());
    let limits = FieldLimits::from(options.as_ref());
    let concurrency = options.max_concurrent_tasks.max(1);

    let outcomes: Vec<_> = stream::iter(sources)
        .map(|source| {
            let retriever = retriever.clone();
            let options = options.clone();
            let completed = completed.clone();
            let task_source = source.clone();

            async move {
                let handle = tokio::spawn(async move {
                    process_feed(&retriever, &task_source, &options, &limits).await
                });
                let outcome = handle.await;

                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                tracing::debug!(feed = %source.url, done = done, total = total, "Feed finished");
                (source, outcome)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut result = RunResult::default();
    for (source, outcome) in outcomes {
        let cause = match outcome {
            Ok(Ok(articles)) => {
                result.accepted.extend(articles.accepted);
                result.rejected.extend(articles.rejected);
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("Feed task failed: {join_error}"),
        };
        tracing::warn!(feed = %source.url, title = %source.title, error = %cause, "Feed failed");
        result.errors.push(FeedFailure {
            feed_title: source.title,
            feed_url: source.url,
            cause,
        });
    }

    result.sort(options.order_by);
    tracing::info!(
        feeds = total,
        accepted = result.accepted.len(),
        rejected = result.rejected.len(),
        errors = result.errors.len(),
        "Run complete"
    );
    result
}

/// Sorts sources by title (stable) and drops repeated URLs, keeping the first.
///
/// One task per URL keeps cache writes for a key from racing each other.
pub fn prepare_sources(mut sources: Vec<FeedSource>) -> Vec<FeedSource> {
    sources.sort_by(|a, b| a.title.cmp(&b.title));

    let mut seen = HashSet::new();
    sources.retain(|source| {
        let first = seen.insert(source.url.clone());
        if !first {
            tracing::warn!(feed = %source.url, title = %source.title, "Skipping duplicate source URL");
        }
        first
    });
    sources
}

async fn process_feed(
    retriever: &Retriever,
    source: &FeedSource,
    options: &FeedOptions,
    limits: &FieldLimits,
) -> Result<FeedArticles, RetrievalError> {
    let acquired = acquire(retriever, &source.url, options).await?;
    let selection = select_entries(&acquired.document, options);

    if selection.stale_channel {
        tracing::debug!(feed = %source.url, "Channel not updated since window start, skipping entries");
    }
    if selection.undated > 0 {
        tracing::debug!(feed = %source.url, undated = selection.undated, "Skipped entries without a date");
    }

    let origin = FeedOrigin {
        feed_title: source.title.clone(),
        feed_url: source.url.clone(),
        channel_image: selection
            .channel_image
            .or_else(|| source.icon_url.clone()),
    };

    let mut articles = FeedArticles::default();
    for entry in selection.entries {
        let article = normalize(classify(entry, &origin, options), limits);
        if article.is_rejected() {
            articles.rejected.push(article);
        } else {
            articles.accepted.push(article);
        }
    }

    tracing::debug!(
        feed = %source.url,
        from_cache = acquired.from_cache,
        repaired = acquired.repaired,
        accepted = articles.accepted.len(),
        rejected = articles.rejected.len(),
        "Processed feed"
    );
    Ok(articles)
}
