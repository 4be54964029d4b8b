use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, ETAG, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, REFERER, USER_AGENT,
};
use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::types::FeedOptions;
use crate::storage::{CacheEntry, CacheStore};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Fixed request headers sent with every feed request.
pub const DEFAULT_HEADERS: [(HeaderName, &str); 5] = [
    (
        USER_AGENT,
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/115.0 Safari/537.36",
    ),
    (
        ACCEPT,
        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
    ),
    (ACCEPT_LANGUAGE, "en-GB,en;q=0.5"),
    (CONNECTION, "keep-alive"),
    (REFERER, "https://www.google.com"),
];

/// Transport-level failures of a single HTTP exchange.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Certificate or handshake failure on an encrypted connection
    #[error("TLS error: {0}")]
    Tls(String),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// DNS, connect, reset and anything else below HTTP
    #[error("Request failed: {0}")]
    Network(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Errors that end a feed's retrieval.
///
/// Always scoped to one feed; the scheduler records them and carries on.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// HTTP response with a status other than 2xx/304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Server answered 304 but there is nothing cached to fall back on
    #[error("Server returned 304 Not Modified but no cached copy exists")]
    NotModifiedWithoutCache,
    /// Feed could not be parsed even after repair
    #[error("Parse error: {0}")]
    Parse(String),
    /// Every step of the fallback chain failed
    #[error("All fetch attempts failed for {url}: {reason}")]
    Exhausted { url: String, reason: String },
}

impl RetrievalError {
    /// True for transport-security failures (the trigger for the http:// retry).
    pub fn is_tls(&self) -> bool {
        matches!(self, RetrievalError::Transport(TransportError::Tls(_)))
    }
}

/// Conditional-request validators taken from a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl From<&CacheEntry> for Validators {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            etag: entry.etag.clone(),
            last_modified: entry.last_modified.clone(),
        }
    }
}

/// Raw outcome of one GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// One HTTP GET with the fixed header set.
///
/// The seam between the pipeline and the network: production uses
/// [`ReqwestTransport`], tests substitute scripted responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        validators: Option<&Validators>,
    ) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client with the fixed header set and a single request timeout.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS {
            headers.insert(name, HeaderValue::from_static(value));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        validators: Option<&Validators>,
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(v) = validators {
            if let Some(etag) = v.etag.as_deref() {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(modified) = v.last_modified.as_deref() {
                request = request.header(IF_MODIFIED_SINCE, modified);
            }
        }

        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);

        let body = if response.status().is_success() {
            read_limited_bytes(response, MAX_FEED_SIZE).await?
        } else {
            Vec::new()
        };

        Ok(HttpResponse {
            status,
            body,
            etag,
            last_modified,
        })
    }
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Maps a reqwest failure onto [`TransportError`], singling out TLS problems.
///
/// A failure counts as TLS only when a [`rustls::Error`] sits somewhere in the
/// source chain, either directly or wrapped inside a `std::io::Error`.
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }

    match find_tls_cause(&err) {
        Some(tls) => TransportError::Tls(tls.to_string()),
        None => TransportError::Network(err.to_string()),
    }
}

fn find_tls_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a rustls::Error> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(cause) = current {
        if let Some(tls) = cause.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        // io::Error::source() skips the wrapped error itself
        if let Some(inner) = cause
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
        {
            if let Some(tls) = find_tls_cause(inner) {
                return Some(tls);
            }
        }
        current = cause.source();
    }
    None
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(TransportError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify_reqwest_error)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(TransportError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

/// Bytes returned by the retriever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub body: Vec<u8>,
    /// True when the body came from the cache (cheap path, 304, or fallback).
    pub from_cache: bool,
}

/// Cache-aware fetcher: one network attempt per call, cache as safety net.
#[derive(Clone)]
pub struct Retriever {
    transport: Arc<dyn Transport>,
    cache: CacheStore,
}

impl Retriever {
    pub fn new(transport: Arc<dyn Transport>, cache: CacheStore) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetches `url` honoring the cache policy in `options`.
    ///
    /// 1. cheap path: with caching on and conditional requests off, a fresh entry
    ///    is returned without touching the network
    /// 2. otherwise one GET, with `If-None-Match`/`If-Modified-Since` when
    ///    conditional requests are on and validators are cached
    /// 3. 304 → cached body, cache untouched
    /// 4. 2xx → body persisted (unless `ignore_cache`) and returned
    /// 5. any failure → the cached body regardless of age, if there is one
    ///
    /// # Errors
    ///
    /// The network error when no cached copy is available.
    pub async fn fetch(&self, url: &str, options: &FeedOptions) -> Result<Fetched, RetrievalError> {
        let cached = if options.ignore_cache {
            None
        } else {
            self.cache.get(url).await
        };

        if options.no_conditional_cache {
            if let Some(entry) = cached.as_ref() {
                if entry.is_fresh(options.cache_max_age) {
                    tracing::debug!(feed = %url, "Serving fresh cache entry without network request");
                    return Ok(Fetched {
                        body: entry.body.clone(),
                        from_cache: true,
                    });
                }
            }
        }

        let validators = if options.conditional_requests() {
            cached
                .as_ref()
                .filter(|e| e.has_validators())
                .map(Validators::from)
        } else {
            None
        };

        let outcome = self.exchange(url, validators.as_ref()).await;

        match outcome {
            Ok(Exchange::NotModified) => match cached {
                Some(entry) => {
                    tracing::debug!(feed = %url, "Not modified, using cached body");
                    Ok(Fetched {
                        body: entry.body,
                        from_cache: true,
                    })
                }
                None => Err(RetrievalError::NotModifiedWithoutCache),
            },
            Ok(Exchange::Body(response)) => {
                if !options.ignore_cache {
                    let (etag, last_modified) = if options.conditional_requests() {
                        (response.etag.as_deref(), response.last_modified.as_deref())
                    } else {
                        (None, None)
                    };
                    self.cache.put(url, &response.body, etag, last_modified).await;
                }
                Ok(Fetched {
                    body: response.body,
                    from_cache: false,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    tracing::warn!(feed = %url, error = %e, "Fetch failed, falling back to cached copy");
                    Ok(Fetched {
                        body: entry.body,
                        from_cache: true,
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Plain GET: no cache reads, no cache writes, no conditional headers.
    pub async fn fetch_direct(&self, url: &str) -> Result<Vec<u8>, RetrievalError> {
        match self.exchange(url, None).await? {
            Exchange::Body(response) => Ok(response.body),
            Exchange::NotModified => Err(RetrievalError::NotModifiedWithoutCache),
        }
    }

    async fn exchange(
        &self,
        url: &str,
        validators: Option<&Validators>,
    ) -> Result<Exchange, RetrievalError> {
        let response = self.transport.get(url, validators).await?;
        match response.status {
            304 => Ok(Exchange::NotModified),
            200..=299 => Ok(Exchange::Body(response)),
            status => Err(RetrievalError::HttpStatus(status)),
        }
    }
}

enum Exchange {
    NotModified,
    Body(HttpResponse),
}
