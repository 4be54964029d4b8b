//! feedsieve: concurrent RSS/Atom retrieval with an on-disk response cache,
//! malformed-feed repair and keyword-based editorial filtering.

pub mod config;
pub mod feed;
pub mod filter;
pub mod report;
pub mod storage;
pub mod util;
