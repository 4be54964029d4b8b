//! Feed acquisition pipeline.
//!
//! - **Source lists**: OPML loading ([`load_source_list`])
//! - **Retrieval**: cache-aware HTTP fetching behind the [`Transport`] seam
//! - **Repair & fallback**: cleanup of malformed markup and the retry chain
//! - **Selection**: date-window filtering of parsed entries
//! - **Scheduling**: bounded concurrent processing of every source ([`run`])
//!
//! # Example
//!
//! ```ignore
//! let sources = feedsieve::feed::load_source_list(path).await?;
//! let transport = Arc::new(ReqwestTransport::new(options.request_timeout)?);
//! let retriever = Retriever::new(transport, CacheStore::new(cache_dir)?);
//! let result = feedsieve::feed::run(&retriever, sources.feeds, &options).await;
//! ```

mod fallback;
mod fetcher;
mod normalize;
mod opml;
mod parser;
mod repair;
mod scheduler;
mod types;

pub use fallback::{acquire, Acquired};
pub use fetcher::{
    Fetched, HttpResponse, ReqwestTransport, RetrievalError, Retriever, Transport, TransportError,
    Validators, DEFAULT_HEADERS,
};
pub use normalize::{normalize, FieldLimits};
pub use opml::{load as load_source_list, parse_source_list, FeedSource, SourceList, SourceListError};
pub use parser::{parse, select_entries, FeedDocument, ParseOutcome, Selection};
pub use repair::repair;
pub use scheduler::{prepare_sources, run};
pub use types::{
    Article, FeedEntry, FeedFailure, FeedOptions, FeedOrigin, OrderBy, RunResult,
    DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_REQUEST_TIMEOUT,
};
