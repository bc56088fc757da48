// Optional key-value cache with per-entry TTL.
//
// Both pipelines treat the cache as an optional collaborator: a miss, an
// expired entry, or the cache being absent entirely must never fail a
// resolution or a narration job. Entries are last-writer-wins overwrites.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a value; None on miss or expiry
    async fn get(&self, key: &str) -> Option<String>;

    /// Store a value with an expiry. Failures are handled internally
    /// (logged), never surfaced to the caller.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration);
}

/// In-process TTL map. Expired entries are dropped lazily on read and
/// swept periodically by a background task (see `sweep_expired`).
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Remove all expired entries. Called from the periodic sweeper.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - entries.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > Instant::now() => {
                    return Some(value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.entries.write().await.remove(key);
        }
        None
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_within_ttl() {
        let cache = MemoryCache::new();
        cache
            .set_ex("stream:21:21-ep-5", "cached".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("stream:21:21-ep-5").await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = MemoryCache::new();
        cache
            .set_ex("k", "v".to_string(), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn overwrite_is_last_writer_wins() {
        let cache = MemoryCache::new();
        cache
            .set_ex("k", "first".to_string(), Duration::from_secs(60))
            .await;
        cache
            .set_ex("k", "second".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn sweep_removes_only_expired() {
        let cache = MemoryCache::new();
        cache
            .set_ex("short", "v".to_string(), Duration::from_millis(5))
            .await;
        cache
            .set_ex("long", "v".to_string(), Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.get("long").await.is_some());
    }
}
