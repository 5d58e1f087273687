//! Cache-aside layer.
//!
//! - [`CacheBackend`]: keyed string store with TTL and pattern scan.
//! - [`CacheRepository`]: typed JSON snapshots over a backend.
//! - [`CacheAside`]: the read / warm / invalidate contract orchestrators use.

mod aside;
mod key;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod repository;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use aside::CacheAside;
pub use key::{CacheKey, USERS_NAMESPACE, users_list_key};
pub use memory::{InMemoryCache, glob_match};
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
pub use repository::{CacheRepository, DEFAULT_TTL};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization failed: {0}")]
    Serialization(String),

    #[error("corrupt cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

impl CacheError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Keyed string store with TTL support.
///
/// Implementations are internally thread-safe and shared by every request.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// `Ok(None)` is a clean miss.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete `keys` in one batch; returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Every live key matching the glob `pattern`.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}

#[async_trait]
impl<B> CacheBackend for Arc<B>
where
    B: CacheBackend + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set_ex(key, value, ttl).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        (**self).del(keys).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        (**self).scan(pattern).await
    }
}

/// Follow a SCAN-style cursor from 0 until the backend hands back 0.
///
/// `step(cursor)` returns the next cursor and one batch of keys. Any failed
/// step fails the whole scan; a partial key list is never returned.
pub async fn drain_cursor<F, Fut>(mut step: F) -> Result<Vec<String>, CacheError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<(u64, Vec<String>), CacheError>>,
{
    // SCAN may yield a key more than once.
    let mut keys = BTreeSet::new();
    let mut cursor = 0;
    loop {
        let (next, batch) = step(cursor).await?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    Ok(keys.into_iter().collect())
}
