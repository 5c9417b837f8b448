//! Roster Storage - Store and Cache Seams plus the Cache-Aside Path
//!
//! Defines the [`RecordStore`] and [`CacheClient`] abstractions, a RESP2
//! cache client and an in-memory cache, the row set payload codec, the
//! [`CacheAside`] orchestrator and the per-session [`SessionCounter`] with
//! its in-memory and Redis-backed stores.
//! The PostgreSQL record store lives in roster-api.

pub mod cache;
pub mod cache_aside;
pub mod codec;
pub mod session;
pub mod store;

pub use cache::{CacheClient, InMemoryCache, RedisCacheClient, RespError, RespValue};
pub use cache_aside::{
    CacheAside, CacheAsideConfig, CacheAsideStats, CacheLookup, Resolution, RowSource,
};
pub use codec::{decode_row_set, encode_row_set};
pub use session::{
    FallbackSessionStore, InMemorySessionStore, RedisSessionStore, SessionCounter, SessionStore,
    SESSION_KEY_PREFIX,
};
pub use store::RecordStore;
