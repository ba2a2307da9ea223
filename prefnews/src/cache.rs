/*!
TTL cache for the rendered feed document.

The cache is an owned object handed to the request handler (no ambient
global state): `get`/`put`/`is_stale` in memory, plus a best-effort
last-known-good copy on disk that is only consulted when both the memory
cache and a live regeneration have failed.
*/

use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use tracing::{debug, warn};

/// A rendered document and the instant it was produced.
#[derive(Debug, Clone)]
pub struct CachedDoc {
    pub xml: String,
    pub rendered_at: DateTime<Utc>,
}

/// WARM when a document is held, COLD otherwise. The only invalidation is
/// TTL expiry; a process restart starts COLD.
#[derive(Debug)]
pub struct FeedCache {
    doc: Option<CachedDoc>,
    ttl: Duration,
    disk_path: Option<PathBuf>,
}

impl FeedCache {
    pub fn new(ttl_seconds: i64, disk_path: Option<PathBuf>) -> Self {
        FeedCache {
            doc: None,
            ttl: Duration::seconds(ttl_seconds),
            disk_path,
        }
    }

    pub fn get(&self) -> Option<&CachedDoc> {
        self.doc.as_ref()
    }

    /// COLD caches are always stale; WARM caches go stale once the TTL has
    /// fully elapsed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match &self.doc {
            Some(doc) => now - doc.rendered_at >= self.ttl,
            None => true,
        }
    }

    /// Store a freshly rendered document and overwrite the on-disk copy.
    /// Disk trouble is logged and swallowed; the memory cache is already
    /// updated and the request must not fail over a persistence hiccup.
    pub async fn put(&mut self, xml: String, now: DateTime<Utc>) {
        if let Some(path) = &self.disk_path {
            if let Some(parent) = path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    warn!(
                        "failed to create cache directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Err(e) = tokio::fs::write(path, &xml).await {
                warn!("failed to persist feed to {}: {}", path.display(), e);
            }
        }

        self.doc = Some(CachedDoc {
            xml,
            rendered_at: now,
        });
    }

    /// Read the last-known-good document, if a path is configured and the
    /// file holds anything.
    pub async fn load_from_disk(&self) -> Option<String> {
        let path = self.disk_path.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(xml) if !xml.is_empty() => Some(xml),
            Ok(_) => None,
            Err(e) => {
                debug!("no disk fallback at {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn ttl_timeline_cold_warm_stale() {
        let mut cache = FeedCache::new(600, None);

        // Cold cache: always stale.
        assert!(cache.is_stale(t0()));
        assert!(cache.get().is_none());

        cache.put("<rss/>".to_string(), t0()).await;

        // Within the TTL the document is served as-is.
        assert!(!cache.is_stale(t0() + Duration::seconds(300)));
        assert_eq!(cache.get().map(|d| d.xml.as_str()), Some("<rss/>"));

        // Past the TTL a regeneration is due.
        assert!(cache.is_stale(t0() + Duration::seconds(700)));
        // The stale document is still available for fallback.
        assert_eq!(cache.get().map(|d| d.xml.as_str()), Some("<rss/>"));
    }

    #[tokio::test]
    async fn put_persists_and_load_recovers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("last_feed.xml");

        let mut cache = FeedCache::new(600, Some(path.clone()));
        cache.put("<rss>doc</rss>".to_string(), t0()).await;

        // A fresh (cold) cache with the same path recovers the document.
        let cold = FeedCache::new(600, Some(path));
        assert!(cold.get().is_none());
        assert_eq!(cold.load_from_disk().await.as_deref(), Some("<rss>doc</rss>"));
    }

    #[tokio::test]
    async fn load_without_path_or_file_is_none() {
        let no_path = FeedCache::new(600, None);
        assert!(no_path.load_from_disk().await.is_none());

        let dir = tempfile::tempdir().expect("tempdir");
        let missing = FeedCache::new(600, Some(dir.path().join("absent.xml")));
        assert!(missing.load_from_disk().await.is_none());
    }
}
