use super::fetcher::{RetrievalError, Retriever};
use super::parser::{parse, FeedDocument, ParseOutcome};
use super::repair::repair;
use super::types::FeedOptions;
use crate::util::{is_https, to_plain_http};

/// A parsed document together with how it was obtained.
#[derive(Debug)]
pub struct Acquired {
    pub document: Box<FeedDocument>,
    /// URL the document was finally read from (differs after a scheme swap).
    pub effective_url: String,
    pub from_cache: bool,
    /// True when the bytes only parsed after [`repair`].
    pub repaired: bool,
}

/// Retrieves and parses one feed, walking the fallback chain until a step succeeds.
///
/// 1. cache-aware fetch, parse as-is
/// 2. malformed: plain refetch, repair, parse
/// 3. TLS failure on an `https://` URL: the same against the `http://` variant,
///    then one last plain fetch of the original URL with repair
///
/// # Errors
///
/// Transport errors other than TLS are returned unchanged. A chain that runs out
/// of steps ends in [`RetrievalError::Exhausted`].
pub async fn acquire(
    retriever: &Retriever,
    url: &str,
    options: &FeedOptions,
) -> Result<Acquired, RetrievalError> {
    match retriever.fetch(url, options).await {
        Ok(fetched) => {
            let reason = match parse(&fetched.body) {
                ParseOutcome::WellFormed(document) => {
                    return Ok(Acquired {
                        document,
                        effective_url: url.to_string(),
                        from_cache: fetched.from_cache,
                        repaired: false,
                    })
                }
                ParseOutcome::Malformed(reason) => reason,
            };

            tracing::debug!(feed = %url, error = %reason, "Malformed feed, refetching for repair");
            let (body, from_cache) = match retriever.fetch_direct(url).await {
                Ok(body) => (body, false),
                Err(e) => {
                    tracing::debug!(feed = %url, error = %e, "Refetch failed, repairing the bytes already held");
                    (fetched.body, fetched.from_cache)
                }
            };
            repaired(url, &body, from_cache).map_err(|reason| exhausted(url, reason))
        }
        Err(e) if e.is_tls() && is_https(url) => {
            tracing::warn!(feed = %url, error = %e, "TLS failure, retrying over plain http");
            if let Some(plain) = to_plain_http(url) {
                match try_plain(retriever, &plain).await {
                    Ok(acquired) => return Ok(acquired),
                    Err(reason) => {
                        tracing::debug!(feed = %plain, error = %reason, "Plain http variant failed")
                    }
                }
            }

            let body = retriever
                .fetch_direct(url)
                .await
                .map_err(|e| exhausted(url, e.to_string()))?;
            repaired(url, &body, false).map_err(|reason| exhausted(url, reason))
        }
        Err(e) => Err(e),
    }
}

/// Direct fetch of `url`, parsed as-is and then once more after repair.
async fn try_plain(retriever: &Retriever, url: &str) -> Result<Acquired, String> {
    let body = retriever.fetch_direct(url).await.map_err(|e| e.to_string())?;
    if let ParseOutcome::WellFormed(document) = parse(&body) {
        return Ok(Acquired {
            document,
            effective_url: url.to_string(),
            from_cache: false,
            repaired: false,
        });
    }
    repaired(url, &body, false)
}

fn repaired(url: &str, body: &[u8], from_cache: bool) -> Result<Acquired, String> {
    match parse(&repair(body)) {
        ParseOutcome::WellFormed(document) => Ok(Acquired {
            document,
            effective_url: url.to_string(),
            from_cache,
            repaired: true,
        }),
        ParseOutcome::Malformed(reason) => Err(reason),
    }
}

fn exhausted(url: &str, reason: String) -> RetrievalError {
    RetrievalError::Exhausted {
        url: url.to_string(),
        reason,
    }
}
