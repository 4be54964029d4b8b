//! End-to-end runs of the scheduler against an in-process transport.
//!
//! Every test gets its own temporary cache directory. The transport replays a
//! fixed reply per URL, so TLS and DNS failures can be produced on demand.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use feedsieve::feed::{
    self, FeedOptions, FeedSource, HttpResponse, Retriever, Transport, TransportError, Validators,
};
use feedsieve::storage::CacheStore;

type Reply = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct FakeNet {
    replies: HashMap<String, Reply>,
    calls: Mutex<Vec<String>>,
}

impl FakeNet {
    fn with(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Transport for FakeNet {
    async fn get(&self, url: &str, _: Option<&Validators>) -> Reply {
        self.calls.lock().unwrap().push(url.to_string());
        self.replies
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(TransportError::Network(format!("dns error: no host for {url}"))))
    }
}

fn ok(body: String) -> Reply {
    Ok(HttpResponse {
        status: 200,
        body: body.into_bytes(),
        etag: None,
        last_modified: None,
    })
}

/// RSS document whose items were all published within the last few hours.
fn rss(items: &[(&str, &str)]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title>"#);
    for (i, (title, description)) in items.iter().enumerate() {
        let published = (Utc::now() - ChronoDuration::hours(i as i64 + 1)).to_rfc2822();
        xml.push_str(&format!(
            "<item><title>{title}</title><link>https://news.example.com/{i}</link>\
             <description>{description}</description><pubDate>{published}</pubDate></item>"
        ));
    }
    xml.push_str("</channel></rss>");
    xml
}

fn source(title: &str, url: &str) -> FeedSource {
    FeedSource {
        title: title.into(),
        url: url.into(),
        icon_url: None,
    }
}

fn options() -> FeedOptions {
    let now = Utc::now();
    let mut opts = FeedOptions::new(now - ChronoDuration::days(1), now + ChronoDuration::minutes(5));
    opts.exclude_keywords = ["sponsored".to_string()].into();
    opts.keyword_exceptions = feedsieve::filter::keywords::default_exceptions();
    opts
}

const FEED_A: &str = "https://a.example.com/rss";
const FEED_B: &str = "https://b.example.com/rss";
const FEED_C: &str = "https://c.example.com/rss";

#[tokio::test]
async fn test_mixed_run_partial_results() {
    let feed_a = rss(&[
        ("Router flaw patched", "Vendors ship fixes"),
        ("This is a sponsored post", "Buy now"),
        ("State-sponsored group targets banks", "Attribution report"),
        ("Weekly roundup", "Paid placement, sponsored by Acme"),
        ("Kernel release", "New scheduler"),
    ]);
    let net = Arc::new(
        FakeNet::default()
            .with(FEED_A, ok(feed_a))
            .with(FEED_B, Err(TransportError::Timeout))
            .with(FEED_C, Err(TransportError::Network("dns error: failed to lookup address".into()))),
    );

    let dir = tempfile::tempdir().unwrap();
    let cache = CacheStore::new(dir.path()).unwrap();
    cache
        .try_put(FEED_B, rss(&[("Cached one", "x"), ("Cached two", "y")]).as_bytes(), None, None)
        .await
        .unwrap();
    let retriever = Retriever::new(net.clone(), cache);

    let mut opts = options();
    // Revalidate instead of trusting the fresh entry, so feed B really times out
    opts.no_conditional_cache = false;

    let sources = vec![source("A", FEED_A), source("B", FEED_B), source("C", FEED_C)];
    let result = feed::run(&retriever, sources, &opts).await;

    assert_eq!(result.accepted.len(), 5);
    assert_eq!(result.rejected.len(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].feed_title, "C");
    assert_eq!(result.errors[0].feed_url, FEED_C);
    assert_eq!(net.calls_to(FEED_B), 1);

    for article in &result.rejected {
        assert_eq!(article.skipped_reason.as_deref(), Some("Matched keyword: sponsored"));
    }
    for article in &result.accepted {
        assert!(opts.in_range(article.published));
        assert!(article.skipped_reason.is_none());
    }
}

#[tokio::test]
async fn test_exhausted_fallback_chain_yields_one_error() {
    let broken = "https://broken.example.com/rss";
    let net = Arc::new(
        FakeNet::default()
            .with(FEED_A, ok(rss(&[("Fine", "ok")])))
            .with(broken, Err(TransportError::Tls("certificate expired".into())))
            .with("http://broken.example.com/rss", ok("<html>not a feed".into())),
    );

    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(net.clone(), CacheStore::new(dir.path()).unwrap());

    let sources = vec![source("Broken", broken), source("A", FEED_A)];
    let result = feed::run(&retriever, sources, &options()).await;

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].feed_url, broken);
    assert_eq!(result.accepted.len(), 1);
    assert!(result
        .accepted
        .iter()
        .chain(&result.rejected)
        .all(|a| a.feed_url != broken));
    // initial attempt plus the final retry of the original URL
    assert_eq!(net.calls_to(broken), 2);
    assert_eq!(net.calls_to("http://broken.example.com/rss"), 1);
}

#[tokio::test]
async fn test_partition_is_total_and_disjoint() {
    let net = Arc::new(FakeNet::default().with(
        FEED_A,
        ok(rss(&[
            ("sponsored giveaway", ""),
            ("security advisory", ""),
            ("plain news", ""),
        ])),
    ));
    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(net, CacheStore::new(dir.path()).unwrap());

    let mut opts = options();
    opts.aggressive_keywords = ["security".to_string()].into();
    let result = feed::run(&retriever, vec![source("A", FEED_A)], &opts).await;

    assert_eq!(result.accepted.len() + result.rejected.len(), 3);
    assert_eq!(result.accepted.len(), 1);
    assert_eq!(result.accepted[0].title, "security advisory");
    assert!(result.rejected.iter().all(|a| a.skipped_reason.is_some()));
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let net = Arc::new(FakeNet::default().with(FEED_A, ok(rss(&[("Once", "")]))));
    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(net.clone(), CacheStore::new(dir.path()).unwrap());
    let opts = options();

    let first = feed::run(&retriever, vec![source("A", FEED_A)], &opts).await;
    let second = feed::run(&retriever, vec![source("A", FEED_A)], &opts).await;

    assert_eq!(first.accepted, second.accepted);
    assert_eq!(net.calls_to(FEED_A), 1);
}

#[tokio::test]
async fn test_mixed_case_keywords_through_options() {
    let title = "This is a Sponsored post about Security";
    let net = Arc::new(FakeNet::default().with(FEED_A, ok(rss(&[(title, "")]))));
    let dir = tempfile::tempdir().unwrap();
    let retriever = Retriever::new(net, CacheStore::new(dir.path()).unwrap());

    let mut excluding = options();
    excluding.exclude_keywords = ["Sponsored".to_string()].into();
    let result = feed::run(&retriever, vec![source("A", FEED_A)], &excluding).await;
    assert_eq!(result.accepted.len(), 0);
    assert_eq!(result.rejected[0].skipped_reason.as_deref(), Some("Matched keyword: sponsored"));

    let mut aggressive = options();
    aggressive.exclude_keywords.clear();
    aggressive.aggressive_keywords = ["Security".to_string()].into();
    let result = feed::run(&retriever, vec![source("A", FEED_A)], &aggressive).await;
    assert_eq!(result.accepted.len(), 1);
    assert_eq!(result.accepted[0].title, title);
}
