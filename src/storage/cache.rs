use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

use super::types::{CacheEntry, CacheError, CacheMetadata, PruneStats};

const BODY_EXT: &str = "body";
const META_EXT: &str = "meta.json";

/// On-disk response cache keyed by a hash of the feed URL.
///
/// Each URL maps to two files in one flat directory:
///
/// - `<sha256(url)>.body` holds the raw response bytes
/// - `<sha256(url)>.meta.json` holds [`CacheMetadata`]
///
/// Both files are replaced with write-to-temp-then-rename, so readers never see a
/// partially written file. The store does no locking; callers guarantee that at most
/// one task touches a given URL at a time (the scheduler de-duplicates sources).
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Opens (and creates if needed) the cache directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| CacheError::CreateDir {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable cache key for a URL: lowercase hex SHA-256.
    pub fn key_for(url: &str) -> String {
        format!("{:x}", Sha256::digest(url.as_bytes()))
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{BODY_EXT}"))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{META_EXT}"))
    }

    /// Looks up the cached response for `url`.
    ///
    /// Returns `None` when nothing is cached or the body cannot be read. A missing or
    /// corrupt metadata file degrades to "no validators" with the body's mtime as
    /// the fetch time.
    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        let key = Self::key_for(url);
        let body_path = self.body_path(&key);

        let body = match tokio::fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(url = %url, path = %body_path.display(), error = %e, "Failed to read cached body");
                return None;
            }
        };

        let meta = self.read_metadata(&key).await;
        let fetched_at = match meta.fetched_at {
            Some(ts) => ts,
            None => file_mtime(&body_path).await,
        };

        Some(CacheEntry {
            key,
            body,
            fetched_at,
            etag: meta.etag,
            last_modified: meta.last_modified,
        })
    }

    async fn read_metadata(&self, key: &str) -> CacheMetadata {
        let path = self.meta_path(key);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                tracing::debug!(path = %path.display(), error = %e, "Ignoring corrupt cache metadata");
                CacheMetadata::default()
            }),
            Err(_) => CacheMetadata::default(),
        }
    }

    /// Persists a fresh response, replacing whatever was cached for `url`.
    pub async fn try_put(
        &self,
        url: &str,
        body: &[u8],
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), CacheError> {
        let meta = CacheMetadata {
            etag: etag.map(str::to_owned),
            last_modified: last_modified.map(str::to_owned),
            fetched_at: Some(Utc::now()),
        };
        self.write_entry(url, body, &meta).await
    }

    /// Like [`try_put`](Self::try_put), but logs and swallows failures.
    ///
    /// A failed cache write must never fail the fetch that produced the body.
    pub async fn put(&self, url: &str, body: &[u8], etag: Option<&str>, last_modified: Option<&str>) {
        if let Err(e) = self.try_put(url, body, etag, last_modified).await {
            tracing::warn!(url = %url, error = %e, "Cache write failed, continuing with fetched content");
        }
    }

    pub(crate) async fn write_entry(
        &self,
        url: &str,
        body: &[u8],
        meta: &CacheMetadata,
    ) -> Result<(), CacheError> {
        let key = Self::key_for(url);
        let meta_json = serde_json::to_vec(meta)?;
        atomic_write(&self.body_path(&key), body).await?;
        atomic_write(&self.meta_path(&key), &meta_json).await?;
        Ok(())
    }

    /// Deletes entries fetched more than `max_age` ago.
    ///
    /// Files that disappear mid-scan are counted as removed.
    pub async fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        let now = Utc::now();
        let mut stats = PruneStats::default();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(item) = dir.next_entry().await? {
            let name = item.file_name();
            let Some(key) = name
                .to_str()
                .and_then(|n| n.strip_suffix(&format!(".{BODY_EXT}")))
                .map(str::to_owned)
            else {
                continue;
            };

            let meta = self.read_metadata(&key).await;
            let body_path = self.body_path(&key);
            let fetched_at = match meta.fetched_at {
                Some(ts) => ts,
                None => file_mtime(&body_path).await,
            };
            let entry = CacheEntry {
                key: key.clone(),
                body: Vec::new(),
                fetched_at,
                etag: None,
                last_modified: None,
            };

            if entry.is_fresh_at(now, max_age) {
                stats.kept += 1;
                continue;
            }

            remove_if_exists(&body_path).await?;
            remove_if_exists(&self.meta_path(&key)).await?;
            stats.removed += 1;
        }

        tracing::debug!(removed = stats.removed, kept = stats.kept, "Pruned response cache");
        Ok(stats)
    }
}

async fn file_mtime(path: &Path) -> DateTime<Utc> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH))
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Write-to-temp-then-rename so the destination is never left half written.
async fn atomic_write(dst: &Path, content: &[u8]) -> Result<(), CacheError> {
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;

    let written = async {
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    // Windows refuses to rename over an existing file
    #[cfg(windows)]
    if let Err(e) = remove_if_exists(dst).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, dst).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}
