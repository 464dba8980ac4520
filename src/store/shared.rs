//! Redis-backed shared store.
//!
//! # Responsibilities
//! - Connect once at startup and keep a multiplexed, auto-reconnecting connection
//! - Map each store operation onto one atomic server-side step (SET NX EX, an
//!   INCR+EXPIRE script, TTL)
//! - Bound every call with the configured operation timeout
//!
//! # Design Decisions
//! - Errors are never retried here; the caller falls back to the local store
//! - Key counting uses SCAN, not KEYS, so status requests never block the server

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::store::{AtomicStore, StoreError, StoreResult};

const SCAN_BATCH: usize = 500;

/// INCR and EXPIRE run as one script so a counter never outlives its window
/// without a TTL. A key that somehow lost its TTL gets one on the next hit.
const INCREMENT_WITH_EXPIRY: &str = r#"
local count = redis.call('INCR', KEYS[1])
if redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Shared implementation of [`AtomicStore`].
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
    increment_script: Arc<Script>,
}

impl RedisStore {
    /// Connect to `url` and verify the server answers a PING.
    pub async fn connect(url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Backend(format!("invalid URL: {}", e)))?;

        let manager = match timeout(op_timeout, ConnectionManager::new(client)).await {
            Ok(Ok(manager)) => manager,
            Ok(Err(e)) => return Err(StoreError::Backend(e.to_string())),
            Err(_) => return Err(StoreError::Timeout(op_timeout)),
        };

        let store = Self {
            manager,
            op_timeout,
            increment_script: Arc::new(Script::new(INCREMENT_WITH_EXPIRY)),
        };

        let mut conn = store.manager.clone();
        let pong: String = store
            .run(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        tracing::debug!(reply = %pong, "Shared store answered PING");

        Ok(store)
    }

    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AtomicStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn set_if_absent(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let reply: Option<String> = self
            .run(async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(1)
                    .arg("NX")
                    .arg("EX")
                    .arg(secs)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn increment_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let script = self.increment_script.clone();
        self.run(async move { script.key(key).arg(secs).invoke_async(&mut conn).await })
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.manager.clone();
        let remaining: i64 = self
            .run(async move { redis::cmd("TTL").arg(key).query_async(&mut conn).await })
            .await?;
        // -2: missing key, -1: no expiry.
        Ok((remaining >= 0).then_some(remaining))
    }

    async fn count_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut total = 0usize;
        loop {
            let mut conn = self.manager.clone();
            let pattern = pattern.as_str();
            let (next, keys): (u64, Vec<String>) = self
                .run(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            total += keys.len();
            if next == 0 {
                return Ok(total);
            }
            cursor = next;
        }
    }
}
