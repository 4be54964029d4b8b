use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Failures while reading or persisting cache artifacts.
///
/// Write failures never abort a fetch: the retriever logs them and keeps the
/// in-memory body.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("Failed to create cache directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A body or metadata file could not be written or renamed into place.
    #[error("Failed to write cache entry: {0}")]
    Write(#[from] std::io::Error),

    /// The metadata record could not be serialized.
    #[error("Failed to encode cache metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Cache Records
// ============================================================================

/// Revalidation metadata stored next to each cached body.
///
/// Persisted as a flat JSON object: `{"etag": ..., "last_modified": ..., "fetched_at": ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Missing in records written by older versions; the body's mtime is used instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

/// The last good response for one feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Hex SHA-256 of the feed URL.
    pub key: String,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheEntry {
    /// True iff the entry is younger than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.is_fresh_at(Utc::now(), max_age)
    }

    pub(crate) fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return true;
        };
        now.signed_duration_since(self.fetched_at) < max_age
    }

    /// Whether this entry carries anything usable for a conditional request.
    pub fn has_validators(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

/// Summary returned by [`super::CacheStore::prune`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub removed: usize,
    pub kept: usize,
}
