//! TTL-bounded response store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::cache::key::CacheKey;
use crate::observability::metrics;

/// A fully buffered upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
struct Entry {
    value: CachedResponse,
    expires_at: Instant,
}

/// A thread-safe response cache shared by all routes.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<CacheKey, Entry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry. Expired entries are removed and count as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.get_at(key, Instant::now())
    }

    /// Store a response for `ttl`.
    pub fn set(&self, key: CacheKey, value: CachedResponse, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.inner.len());
        metrics::record_cache_size(self.inner.len());
        removed
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_janitor(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.len(), "Expired cache entries purged");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<CachedResponse> {
        let hit = self
            .inner
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());

        if hit.is_none() {
            // Lazy eviction; re-check expiry in case a fresh entry raced in.
            self.inner.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    fn set_at(&self, key: CacheKey, value: CachedResponse, ttl: Duration, now: Instant) {
        if ttl.is_zero() {
            return;
        }
        self.inner.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        metrics::record_cache_size(self.inner.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn key(path: &str) -> CacheKey {
        CacheKey::new("svc", &Method::GET, path, None)
    }

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            content_type: Some("application/json".into()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = ResponseCache::new();
        let t0 = Instant::now();
        cache.set_at(key("/a"), response("{}"), Duration::from_secs(10), t0);

        let hit = cache.get_at(&key("/a"), t0 + Duration::from_secs(9)).unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"{}"));
        assert!(cache.get_at(&key("/b"), t0).is_none());
    }

    #[test]
    fn test_expired_is_miss_and_evicted() {
        let cache = ResponseCache::new();
        let t0 = Instant::now();
        cache.set_at(key("/a"), response("{}"), Duration::from_secs(10), t0);

        assert!(cache.get_at(&key("/a"), t0 + Duration::from_secs(10)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_not_stored() {
        let cache = ResponseCache::new();
        cache.set(key("/a"), response("{}"), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = ResponseCache::new();
        let past = Instant::now() - Duration::from_secs(5);
        cache.set_at(key("/old"), response("old"), Duration::from_secs(1), past);
        cache.set(key("/new"), response("new"), Duration::from_secs(60));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("/new")).is_some());
    }

    #[tokio::test]
    async fn test_janitor_purges_until_shutdown() {
        let cache = ResponseCache::new();
        let past = Instant::now() - Duration::from_secs(5);
        cache.set_at(key("/old"), response("old"), Duration::from_secs(1), past);

        let (tx, rx) = broadcast::channel(1);
        let janitor = tokio::spawn(cache.clone().run_janitor(Duration::from_millis(20), rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        tx.send(()).unwrap();
        janitor.await.unwrap();
    }
}
