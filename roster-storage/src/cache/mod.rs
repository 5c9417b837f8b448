//! Shared key-value cache.
//!
//! [`CacheClient`] is the seam; [`RedisCacheClient`] talks to a
//! Redis-compatible server over RESP2 and [`InMemoryCache`] keeps entries in
//! process (used by tests and as a substitutable fake).

pub mod memory;
pub mod redis_client;
pub mod resp;
pub mod traits;

pub use memory::InMemoryCache;
pub use redis_client::RedisCacheClient;
pub use resp::{encode_command, RespError, RespValue};
pub use traits::CacheClient;
