//! Cache client trait.
//!
//! The cache is a byte-string keyed store with per-entry expiry. Values are
//! opaque bytes; callers own the serialization format.

use std::time::Duration;

use async_trait::async_trait;
use roster_core::CacheError;

/// Client for a shared key-value cache.
///
/// Implementations should be thread-safe and support concurrent access.
/// Any error means "the cache could not be used for this call"; the
/// cache-aside path treats every [`CacheError`] as non-fatal.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Get the bytes stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value, expiring
    /// after `ttl`.
    ///
    /// The write is all-or-nothing: readers observe either the old entry,
    /// the new entry, or nothing.
    async fn set_with_expiry(&self, key: &str, value: &[u8], ttl: Duration)
        -> Result<(), CacheError>;
}
