use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::{CacheBackend, CacheError};

/// Default lifetime of a cached result set.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Typed result-set snapshots over a [`CacheBackend`].
///
/// An entry is a whole JSON array written in one `set`; entries are never
/// merged or patched, only replaced or deleted.
pub struct CacheRepository<T> {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheRepository<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            ttl: self.ttl,
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for CacheRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRepository").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl<T> CacheRepository<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_ttl(backend, DEFAULT_TTL)
    }

    pub fn with_ttl(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            _entity: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `Ok(None)` is a miss. Backend failures and undecodable entries are
    /// errors, never misses.
    #[instrument(skip(self), err)]
    pub async fn get_from_cache(&self, key: &str) -> Result<Option<Vec<T>>, CacheError> {
        let Some(raw) = self.backend.get(key).await? else {
            debug!("cache miss");
            return Ok(None);
        };
        let entities = serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt {
            key: key.to_owned(),
            reason: e.to_string(),
        })?;
        debug!("cache hit");
        Ok(Some(entities))
    }

    #[instrument(skip(self, entities), fields(count = entities.len()), err)]
    pub async fn set_to_cache(&self, key: &str, entities: &[T]) -> Result<(), CacheError> {
        let raw = serde_json::to_string(entities).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.backend.set_ex(key, raw, self.ttl).await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_to_cache(&self, key: &str) -> Result<(), CacheError> {
        self.backend.del(&[key.to_owned()]).await.map(|_| ())
    }

    /// Scan `pattern` and delete all matches in one batch.
    ///
    /// A failed scan deletes nothing. Zero matches is success.
    #[instrument(skip(self), err)]
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let keys = self.backend.scan(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted = self.backend.del(&keys).await?;
        debug!(matched = keys.len(), deleted, "invalidated cache keys");
        Ok(deleted)
    }
}
