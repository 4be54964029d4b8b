//! Local persistence: the on-disk response cache.

mod cache;
mod types;

pub use cache::CacheStore;
pub use types::{CacheEntry, CacheError, CacheMetadata, PruneStats};
