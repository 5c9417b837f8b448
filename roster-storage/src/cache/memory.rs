//! Process-local [`CacheClient`] with TTL expiry.
//!
//! Expiry is measured on `tokio::time::Instant`, so tests can drive it with
//! a paused clock. Expired entries are dropped lazily on read.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use roster_core::CacheError;
use tokio::time::Instant;

use super::traits::CacheClient;

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory cache backend.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set_with_expiry` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Overwrite the raw bytes of an entry, keeping its expiry.
    ///
    /// Returns false if the key is absent. Used to simulate corrupted
    /// payloads.
    pub fn overwrite_raw(&self, key: &str, value: Vec<u8>) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.value = value;
                true
            }
            None => false,
        }
    }

    /// Remaining lifetime of `key`, if present and unexpired.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|entry| entry.expires_at.checked_duration_since(now))
            .filter(|remaining| !remaining.is_zero())
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, entry| now >= entry.expires_at);
        Ok(None)
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_lives_for_exactly_ttl() -> Result<(), CacheError> {
        let cache = InMemoryCache::new();
        cache
            .set_with_expiry("k", b"v", Duration::from_secs(30))
            .await?;

        tokio::time::advance(Duration::from_millis(29_999)).await;
        assert_eq!(cache.get("k").await?, Some(b"v".to_vec()));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k").await?, None);
        assert_eq!(cache.ttl("k"), None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_resets_expiry() -> Result<(), CacheError> {
        let cache = InMemoryCache::new();
        cache
            .set_with_expiry("k", b"old", Duration::from_secs(30))
            .await?;
        tokio::time::advance(Duration::from_secs(20)).await;
        cache
            .set_with_expiry("k", b"new", Duration::from_secs(30))
            .await?;
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(cache.get("k").await?, Some(b"new".to_vec()));
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(10)));
        assert_eq!(cache.write_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_overwrite_raw_requires_existing_key() -> Result<(), CacheError> {
        let cache = InMemoryCache::new();
        assert!(!cache.overwrite_raw("k", b"x".to_vec()));
        cache
            .set_with_expiry("k", b"v", Duration::from_secs(30))
            .await?;
        assert!(cache.overwrite_raw("k", b"x".to_vec()));
        assert_eq!(cache.get("k").await?, Some(b"x".to_vec()));
        Ok(())
    }
}
