//! Cache-aside read path for the shared row set.
//!
//! On every request:
//! 1. read the shared cache slot;
//! 2. on a hit, decode and return it (undecodable bytes count as a miss);
//! 3. otherwise read the whole table from the record store, which is the
//!    only failure surfaced to the caller;
//! 4. write the fresh row set back with the configured TTL, ignoring any
//!    cache failure;
//! 5. return the fresh rows.
//!
//! Concurrent misses are not coordinated. Each one queries the store and
//! overwrites the slot with an equivalent payload, so the extra work is
//! bounded by the TTL and the last writer winning is harmless.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use roster_core::{
    CacheConfig, CacheError, CodecError, DatabaseConfig, RowSet, ServiceError, TableName,
};

use crate::cache::CacheClient;
use crate::codec::{decode_row_set, encode_row_set};
use crate::store::RecordStore;

/// Outcome of reading the shared cache slot.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// The slot held a decodable row set.
    Hit(RowSet),
    /// The slot was absent, expired or empty.
    Miss,
    /// The slot held bytes that do not decode to a row set.
    Corrupt(CodecError),
    /// The cache could not be reached or answered badly.
    Unavailable(CacheError),
}

/// Where a resolved row set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    Cache,
    Store,
}

/// A resolved row set plus its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub rows: RowSet,
    pub source: RowSource,
}

/// Settings for the cache-aside path.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheAsideConfig {
    pub table: TableName,
    pub key: String,
    pub ttl: Duration,
}

impl CacheAsideConfig {
    pub fn new(table: TableName, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            table,
            key: key.into(),
            ttl,
        }
    }

    pub fn from_config(database: &DatabaseConfig, cache: &CacheConfig) -> Self {
        Self::new(database.table.clone(), cache.key.clone(), cache.ttl)
    }
}

/// Point-in-time counters for the cache-aside path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheAsideStats {
    pub hits: u64,
    pub misses: u64,
    pub corrupt: u64,
    pub cache_errors: u64,
    pub store_fetches: u64,
    pub store_failures: u64,
    pub cache_write_failures: u64,
}

impl CacheAsideStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.corrupt + self.cache_errors;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
    cache_errors: AtomicU64,
    store_fetches: AtomicU64,
    store_failures: AtomicU64,
    cache_write_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheAsideStats {
        CacheAsideStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            store_fetches: self.store_fetches.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Cache-aside orchestrator binding a [`RecordStore`] and a [`CacheClient`].
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheClient>,
    config: CacheAsideConfig,
    counters: Arc<Counters>,
}

impl CacheAside {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheClient>,
        config: CacheAsideConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &CacheAsideConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheAsideStats {
        self.counters.snapshot()
    }

    /// Resolve the row set, discarding its origin.
    pub async fn get_row_set(&self) -> Result<RowSet, ServiceError> {
        self.resolve().await.map(|resolution| resolution.rows)
    }

    /// Resolve the row set from the cache, falling back to the store.
    pub async fn resolve(&self) -> Result<Resolution, ServiceError> {
        match self.lookup().await {
            CacheLookup::Hit(rows) => {
                tracing::debug!(key = %self.config.key, rows = rows.len(), "Row set served from cache");
                return Ok(Resolution {
                    rows,
                    source: RowSource::Cache,
                });
            }
            CacheLookup::Miss => {
                tracing::debug!(key = %self.config.key, "Cache miss");
            }
            CacheLookup::Corrupt(err) => {
                tracing::warn!(key = %self.config.key, error = %err, "Discarding undecodable cache entry");
            }
            CacheLookup::Unavailable(err) => {
                tracing::warn!(key = %self.config.key, error = %err, "Cache read failed, reading from store");
            }
        }

        Counters::bump(&self.counters.store_fetches);
        let rows = match self.store.fetch_all(&self.config.table).await {
            Ok(rows) => rows,
            Err(err) => {
                Counters::bump(&self.counters.store_failures);
                tracing::error!(table = %self.config.table, error = %err, "Record store read failed");
                return Err(ServiceError::DatabaseUnavailable(err));
            }
        };
        tracing::debug!(table = %self.config.table, rows = rows.len(), "Row set read from store");

        self.populate(&rows).await;
        self.log_stats();

        Ok(Resolution {
            rows,
            source: RowSource::Store,
        })
    }

    /// Read and classify the shared cache slot.
    pub async fn lookup(&self) -> CacheLookup {
        let lookup = match self.cache.get(&self.config.key).await {
            Ok(Some(bytes)) if !bytes.is_empty() => match decode_row_set(&bytes) {
                Ok(rows) => CacheLookup::Hit(rows),
                Err(err) => CacheLookup::Corrupt(err),
            },
            Ok(_) => CacheLookup::Miss,
            Err(err) => CacheLookup::Unavailable(err),
        };

        let counter = match &lookup {
            CacheLookup::Hit(_) => &self.counters.hits,
            CacheLookup::Miss => &self.counters.misses,
            CacheLookup::Corrupt(_) => &self.counters.corrupt,
            CacheLookup::Unavailable(_) => &self.counters.cache_errors,
        };
        Counters::bump(counter);
        lookup
    }

    /// Emit the running counters. Called after every store read, so the
    /// event rate follows the miss rate rather than the request rate.
    fn log_stats(&self) {
        let stats = self.stats();
        tracing::debug!(
            hits = stats.hits,
            misses = stats.misses,
            corrupt = stats.corrupt,
            cache_errors = stats.cache_errors,
            store_fetches = stats.store_fetches,
            store_failures = stats.store_failures,
            cache_write_failures = stats.cache_write_failures,
            hit_rate = stats.hit_rate(),
            "Cache-aside counters"
        );
    }

    /// Write `rows` to the shared slot. Failures are logged, never returned.
    async fn populate(&self, rows: &RowSet) {
        let bytes = match encode_row_set(rows) {
            Ok(bytes) => bytes,
            Err(err) => {
                Counters::bump(&self.counters.cache_write_failures);
                tracing::warn!(key = %self.config.key, error = %err, "Skipping cache write");
                return;
            }
        };

        if let Err(err) = self
            .cache
            .set_with_expiry(&self.config.key, &bytes, self.config.ttl)
            .await
        {
            Counters::bump(&self.counters.cache_write_failures);
            tracing::warn!(key = %self.config.key, error = %err, "Cache write failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use async_trait::async_trait;
    use roster_core::{Row, StoreError};
    use std::sync::atomic::AtomicUsize;

    struct StubStore {
        result: Result<RowSet, StoreError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for StubStore {
        async fn fetch_all(&self, _table: &TableName) -> Result<RowSet, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    struct DownCache;

    #[async_trait]
    impl CacheClient for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }

        async fn set_with_expiry(
            &self,
            _key: &str,
            _value: &[u8],
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::unavailable("connection refused"))
        }
    }

    fn config() -> CacheAsideConfig {
        let table = TableName::parse("DATABASE_TABLE", "employees").unwrap();
        CacheAsideConfig::new(table, "employees_cache", Duration::from_secs(30))
    }

    fn rows() -> RowSet {
        vec![Row::new().with("id", 1).with("name", "Ada")]
    }

    fn stub(result: Result<RowSet, StoreError>) -> Arc<StubStore> {
        Arc::new(StubStore {
            result,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = stub(Ok(rows()));
        let cache = Arc::new(InMemoryCache::new());
        let aside = CacheAside::new(store.clone(), cache.clone(), config());

        let first = aside.resolve().await.unwrap();
        assert_eq!(first.source, RowSource::Store);
        assert_eq!(first.rows, rows());

        let second = aside.resolve().await.unwrap();
        assert_eq!(second.source, RowSource::Cache);
        assert_eq!(second.rows, rows());

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(cache.ttl("employees_cache").is_some());
        assert_eq!(cache.write_count(), 1);
        let stats = aside.stats();
        assert_eq!((stats.hits, stats.misses, stats.store_fetches), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_cache_down_degrades_to_store() {
        let store = stub(Ok(rows()));
        let aside = CacheAside::new(store.clone(), Arc::new(DownCache), config());

        for _ in 0..3 {
            assert_eq!(aside.get_row_set().await, Ok(rows()));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        let stats = aside.stats();
        assert_eq!(stats.cache_errors, 3);
        assert_eq!(stats.cache_write_failures, 3);
    }

    #[tokio::test]
    async fn test_store_down_is_database_unavailable() {
        let store = stub(Err(StoreError::connection("refused")));
        let aside = CacheAside::new(store, Arc::new(InMemoryCache::new()), config());

        assert_eq!(
            aside.get_row_set().await,
            Err(ServiceError::DatabaseUnavailable(StoreError::connection("refused")))
        );
        assert_eq!(aside.stats().store_failures, 1);
    }

    #[tokio::test]
    async fn test_empty_bytes_are_a_miss() {
        let cache = InMemoryCache::new();
        cache
            .set_with_expiry("employees_cache", b"", Duration::from_secs(30))
            .await
            .unwrap();
        let aside = CacheAside::new(stub(Ok(rows())), Arc::new(cache), config());
        assert_eq!(aside.lookup().await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_cached_empty_row_set_is_a_hit() {
        let store = stub(Ok(Vec::new()));
        let aside = CacheAside::new(store.clone(), Arc::new(InMemoryCache::new()), config());

        assert_eq!(aside.resolve().await.unwrap().source, RowSource::Store);
        let second = aside.resolve().await.unwrap();
        assert_eq!(second.source, RowSource::Cache);
        assert!(second.rows.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheAsideStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
        assert_eq!(CacheAsideStats::default().hit_rate(), 0.0);
    }
}
