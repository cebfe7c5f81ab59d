//! Time-boxed response cache for the index feed.
//!
//! Entries are keyed by request path plus page number and go away on expiry, on an
//! explicit [`PageCache::clear`], or when the cache is full and they are the least
//! recently used. Writes to posts do not touch the cache, so a page can show stale
//! content for up to one TTL.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

#[derive(Debug)]
pub struct PageCache<V> {
    ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> PageCache<V> {
    pub fn new(ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let fresh = entries
            .get(key)
            .map(|entry| (entry.inserted_at.elapsed() < self.ttl).then(|| entry.value.clone()));
        match fresh {
            Some(Some(value)) => {
                debug!(key, "page cache hit");
                Some(value)
            }
            Some(None) => {
                entries.pop(key);
                debug!(key, "page cache expired");
                None
            }
            None => {
                debug!(key, "page cache miss");
                None
            }
        }
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().await;
        let evicted = entries.push(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
        if let Some((key, _)) = evicted {
            debug!(key = %key, "page cache evicted");
        }
    }

    pub async fn size(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache<V: Clone>(capacity: usize) -> PageCache<V> {
        PageCache::new(
            Duration::from_secs(20),
            NonZeroUsize::new(capacity).unwrap(),
        )
    }

    #[tokio::test]
    async fn entry_lives_for_the_ttl() {
        tokio::time::pause();
        let cache = cache(8);
        cache.insert("/", "first").await;

        tokio::time::advance(Duration::from_secs(19)).await;
        assert_eq!(cache.get("/").await, Some("first"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("/").await, None);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn keys_include_the_page() {
        let cache = cache(8);
        cache.insert("/?page=2", 2).await;
        assert_eq!(cache.get("/").await, None);
        assert_eq!(cache.get("/?page=2").await, Some(2));
    }

    #[tokio::test]
    async fn distinct_keys_never_grow_past_capacity() {
        let cache = cache(2);
        cache.insert("/?page=1", 1).await;
        cache.insert("/?page=2", 2).await;
        assert_eq!(cache.get("/?page=1").await, Some(1));

        cache.insert("/?page=3", 3).await;
        assert_eq!(cache.size().await, 2);
        assert_eq!(cache.get("/?page=2").await, None);
        assert_eq!(cache.get("/?page=1").await, Some(1));
        assert_eq!(cache.get("/?page=3").await, Some(3));

        for n in 4..100 {
            cache.insert(format!("/?page={n}"), n).await;
        }
        assert_eq!(cache.size().await, 2);
    }

    #[tokio::test]
    async fn clear_drops_everything() {
        let cache = cache(8);
        cache.insert("/", 1).await;
        cache.clear().await;
        assert_eq!(cache.get("/").await, None);
    }
}
