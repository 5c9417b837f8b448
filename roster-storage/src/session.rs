//! Per-session visit counter.
//!
//! The counter does a plain read, increment and write against a
//! [`SessionStore`]. It does not lock across the three steps: requests of a
//! single session are expected to arrive one at a time (a browser waiting on
//! its own page load).
//!
//! Stores:
//! - [`RedisSessionStore`]: one expiring key per session on the shared cache
//!   server, visible to every instance
//! - [`InMemorySessionStore`]: process-local, bounded by idle expiry and a
//!   capacity
//! - [`FallbackSessionStore`]: a primary store backed by a secondary one
//!   while the primary is unreachable

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use roster_core::{
    CacheConfig, SessionConfig, SessionError, DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_LIFETIME,
};
use tokio::time::Instant;

use crate::cache::{CacheClient, RedisCacheClient};

/// Prefix of every session key on the shared cache server.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Storage for per-session visit counts.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current count for `session`, or `None` if never seen or expired.
    async fn load_visits(&self, session: &str) -> Result<Option<u64>, SessionError>;

    /// Replace the count for `session`, restarting its lifetime.
    async fn store_visits(&self, session: &str, visits: u64) -> Result<(), SessionError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct Entry {
    visits: u64,
    last_seen: Instant,
}

/// Process-local session store.
///
/// Sessions idle for longer than `idle` are forgotten. When a new session
/// arrives at `capacity`, expired sessions are purged first and then the
/// least recently seen one is evicted. Under concurrent inserts the bound
/// can be exceeded by the number of racing writers.
#[derive(Debug)]
pub struct InMemorySessionStore {
    visits: DashMap<String, Entry>,
    idle: Duration,
    capacity: usize,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_LIFETIME, DEFAULT_SESSION_CAPACITY)
    }
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle: Duration, capacity: usize) -> Self {
        Self {
            visits: DashMap::new(),
            idle,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_limits(config.lifetime, config.capacity)
    }

    /// Number of sessions currently held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) >= self.idle
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.visits.len();
        self.visits.retain(|_, entry| !self.is_expired(entry, now));
        before.saturating_sub(self.visits.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .visits
            .iter()
            .min_by_key(|entry| entry.value().last_seen)
            .map(|entry| entry.key().clone());
        if let Some(session) = oldest {
            self.visits.remove(&session);
            tracing::debug!(capacity = self.capacity, "Evicted least recently seen session");
        }
    }

    fn make_room(&self) {
        if self.visits.len() < self.capacity {
            return;
        }
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired sessions");
        }
        while self.visits.len() >= self.capacity {
            let before = self.visits.len();
            self.evict_oldest();
            if self.visits.len() == before {
                break;
            }
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_visits(&self, session: &str) -> Result<Option<u64>, SessionError> {
        let now = Instant::now();
        let found = self
            .visits
            .get(session)
            .map(|entry| (entry.visits, self.is_expired(&entry, now)));
        match found {
            Some((visits, false)) => Ok(Some(visits)),
            Some((_, true)) => {
                self.visits
                    .remove_if(session, |_, entry| self.is_expired(entry, now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn store_visits(&self, session: &str, visits: u64) -> Result<(), SessionError> {
        if !self.visits.contains_key(session) {
            self.make_room();
        }
        self.visits.insert(
            session.to_string(),
            Entry {
                visits,
                last_seen: Instant::now(),
            },
        );
        Ok(())
    }
}

// ============================================================================
// SHARED-CACHE STORE
// ============================================================================

/// Session store keeping each counter under `session:<id>` on the shared
/// cache server. Every write restarts the key's expiry.
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Arc<dyn CacheClient>,
    lifetime: Duration,
}

impl RedisSessionStore {
    pub fn new(client: Arc<dyn CacheClient>, lifetime: Duration) -> Self {
        Self { client, lifetime }
    }

    /// Talk to the cache server named in `cache`.
    pub fn from_config(cache: &CacheConfig, session: &SessionConfig) -> Self {
        Self::new(Arc::new(RedisCacheClient::from_config(cache)), session.lifetime)
    }

    pub fn key(session: &str) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, session)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load_visits(&self, session: &str) -> Result<Option<u64>, SessionError> {
        let key = Self::key(session);
        let stored = self
            .client
            .get(&key)
            .await
            .map_err(|e| SessionError::Unavailable {
                reason: e.to_string(),
            })?;
        let Some(bytes) = stored else {
            return Ok(None);
        };
        match std::str::from_utf8(&bytes).ok().and_then(|raw| raw.parse::<u64>().ok()) {
            Some(visits) => Ok(Some(visits)),
            None => {
                tracing::warn!(%key, "Discarding unreadable session counter");
                Ok(None)
            }
        }
    }

    async fn store_visits(&self, session: &str, visits: u64) -> Result<(), SessionError> {
        self.client
            .set_with_expiry(&Self::key(session), visits.to_string().as_bytes(), self.lifetime)
            .await
            .map_err(|e| SessionError::Unavailable {
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// FALLBACK
// ============================================================================

/// Uses `primary` and switches to `fallback` call by call whenever the
/// primary fails, so an unreachable shared store degrades the counter to
/// per-instance counts instead of failing the request.
#[derive(Clone)]
pub struct FallbackSessionStore {
    primary: Arc<dyn SessionStore>,
    fallback: Arc<dyn SessionStore>,
}

impl FallbackSessionStore {
    pub fn new(primary: Arc<dyn SessionStore>, fallback: Arc<dyn SessionStore>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SessionStore for FallbackSessionStore {
    async fn load_visits(&self, session: &str) -> Result<Option<u64>, SessionError> {
        match self.primary.load_visits(session).await {
            Ok(visits) => Ok(visits),
            Err(err) => {
                tracing::warn!(error = %err, "Session read failed, using local sessions");
                self.fallback.load_visits(session).await
            }
        }
    }

    async fn store_visits(&self, session: &str, visits: u64) -> Result<(), SessionError> {
        match self.primary.store_visits(session, visits).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "Session write failed, using local sessions");
                self.fallback.store_visits(session, visits).await
            }
        }
    }
}

// ============================================================================
// COUNTER
// ============================================================================

/// Visit counter over a [`SessionStore`].
#[derive(Clone)]
pub struct SessionCounter {
    store: Arc<dyn SessionStore>,
}

impl SessionCounter {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Increment and return the visit count for `session`; the first visit
    /// returns 1.
    pub async fn increment_visit(&self, session: &str) -> Result<u64, SessionError> {
        let current = self.store.load_visits(session).await?.unwrap_or(0);
        let next = current.saturating_add(1);
        self.store.store_visits(session, next).await?;
        Ok(next)
    }
}
