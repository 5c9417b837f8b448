//! Shared application state for the Axum router.

use std::sync::Arc;

use roster_core::{RosterConfig, SessionBackend};
use roster_storage::{
    CacheAside, CacheAsideConfig, CacheClient, FallbackSessionStore, InMemorySessionStore,
    RecordStore, RedisSessionStore, SessionCounter, SessionStore,
};

use crate::error::ApiResult;
use crate::session::SessionSigner;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cache-aside read path for the row set.
    pub rows: CacheAside,
    /// Per-session visit counter.
    pub visits: SessionCounter,
    pub sessions: SessionSigner,
    pub hostname: Arc<str>,
    pub version: Arc<str>,
}

impl AppState {
    /// Wire the state from validated configuration and injected backends.
    pub fn from_config(
        config: &RosterConfig,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheClient>,
        session_store: Arc<dyn SessionStore>,
    ) -> ApiResult<Self> {
        let rows = CacheAside::new(
            store,
            cache,
            CacheAsideConfig::from_config(&config.database, &config.cache),
        );
        Ok(Self {
            rows,
            visits: SessionCounter::new(session_store),
            sessions: SessionSigner::new(&config.server.secret_key)?,
            hostname: Arc::from(config.server.hostname.as_str()),
            version: Arc::from(config.server.version.as_str()),
        })
    }
}

/// Build the configured session store.
///
/// The Redis backend shares counters across instances and falls back to a
/// bounded local store while Redis is unreachable.
pub fn build_session_store(config: &RosterConfig) -> Arc<dyn SessionStore> {
    let local: Arc<dyn SessionStore> =
        Arc::new(InMemorySessionStore::from_config(&config.session));
    match config.session.backend {
        SessionBackend::Memory => local,
        SessionBackend::Redis => Arc::new(FallbackSessionStore::new(
            Arc::new(RedisSessionStore::from_config(&config.cache, &config.session)),
            local,
        )),
    }
}
