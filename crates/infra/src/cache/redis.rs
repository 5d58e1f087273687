//! Redis-backed cache (optional, `redis` feature).

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{CacheBackend, CacheError, drain_cursor};

const SCAN_BATCH: usize = 500;

/// Shared multiplexed connection; clones are cheap handles onto one socket.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(map_redis_error)?;
        Ok(Self { client, conn })
    }

    pub fn client(&self) -> &redis::Client {
        &self.client
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects 0.
        let seconds = ttl.as_secs().max(1);
        conn.set_ex(key, value, seconds).await.map_err(map_redis_error)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await.map_err(map_redis_error)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        drain_cursor(|cursor| {
            let mut conn = self.conn.clone();
            async move {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async::<_, (u64, Vec<String>)>(&mut conn)
                    .await
                    .map_err(map_redis_error)
            }
        })
        .await
    }
}

fn map_redis_error(err: redis::RedisError) -> CacheError {
    CacheError::backend(err.to_string())
}
