//! Redis-backed [`CacheClient`].
//!
//! Each call opens a fresh TCP connection, sends one RESP command and reads
//! one reply. The whole exchange (connect, write, read) runs under a single
//! deadline so a hung server cannot stall a request.

use std::time::Duration;

use async_trait::async_trait;
use roster_core::{CacheConfig, CacheError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::resp::{encode_command, RespValue};
use super::traits::CacheClient;

const READ_CHUNK: usize = 4096;

/// Cache client speaking RESP2 to a Redis-compatible server.
#[derive(Debug, Clone)]
pub struct RedisCacheClient {
    addr: String,
    timeout: Duration,
}

impl RedisCacheClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.host, config.port, config.timeout)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send one command and return its reply, bounded by the client timeout.
    async fn execute(&self, operation: &str, args: &[&[u8]]) -> Result<RespValue, CacheError> {
        let request = encode_command(args);
        match tokio::time::timeout(self.timeout, self.round_trip(&request)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation: operation.to_string(),
                after: self.timeout,
            }),
        }
    }

    async fn round_trip(&self, request: &[u8]) -> Result<RespValue, CacheError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| CacheError::unavailable(format!("connect to {}: {}", self.addr, e)))?;

        stream
            .write_all(request)
            .await
            .map_err(|e| CacheError::unavailable(format!("write to {}: {}", self.addr, e)))?;

        let mut buf = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((reply, _)) =
                RespValue::parse(&buf).map_err(|e| CacheError::protocol(e.to_string()))?
            {
                return Ok(reply);
            }
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|e| CacheError::unavailable(format!("read from {}: {}", self.addr, e)))?;
            if n == 0 {
                return Err(CacheError::unavailable(format!(
                    "{} closed the connection before replying",
                    self.addr
                )));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self.execute("GET", &[b"GET", key.as_bytes()]).await? {
            RespValue::BulkString(value) => Ok(value),
            RespValue::Error(message) => Err(CacheError::Server { message }),
            other => Err(CacheError::protocol(format!(
                "unexpected reply to GET: {:?}",
                other
            ))),
        }
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        // SETEX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1).to_string();
        match self
            .execute("SETEX", &[b"SETEX", key.as_bytes(), seconds.as_bytes(), value])
            .await?
        {
            RespValue::SimpleString(status) if status == "OK" => Ok(()),
            RespValue::Error(message) => Err(CacheError::Server { message }),
            other => Err(CacheError::protocol(format!(
                "unexpected reply to SETEX: {:?}",
                other
            ))),
        }
    }
}
