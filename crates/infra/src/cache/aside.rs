use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{CacheError, CacheRepository};
use crate::deadline::{Deadlines, RequestContext, Scoped};

/// The cache-aside contract orchestrators build on.
///
/// Failures are deliberately asymmetric:
///
/// | operation          | on failure                 |
/// |--------------------|----------------------------|
/// | `read`             | error returned             |
/// | `warm_cache`       | logged, request continues  |
/// | `invalidate_cache` | error returned             |
///
/// A failed warm costs a future miss; a failed invalidation leaves stale
/// entries behind a successful write.
pub struct CacheAside<T> {
    repo: CacheRepository<T>,
    deadlines: Deadlines,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            deadlines: self.deadlines,
        }
    }
}

impl<T> std::fmt::Debug for CacheAside<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAside")
            .field("repo", &self.repo)
            .field("deadlines", &self.deadlines)
            .finish()
    }
}

impl<T> CacheAside<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(repo: CacheRepository<T>, deadlines: Deadlines) -> Self {
        Self { repo, deadlines }
    }

    pub fn repository(&self) -> &CacheRepository<T> {
        &self.repo
    }

    pub async fn read(&self, ctx: &RequestContext, key: &str) -> Result<Option<Vec<T>>, Scoped<CacheError>> {
        self.deadlines.cache(ctx, self.repo.get_from_cache(key)).await
    }

    /// Populate `key` after a source-of-truth read. Never fails the caller.
    pub async fn warm_cache(&self, ctx: &RequestContext, key: &str, entities: &[T]) {
        if let Err(e) = self.deadlines.cache(ctx, self.repo.set_to_cache(key, entities)).await {
            warn!(key, error = %e, "cache warm failed; serving uncached result");
        }
    }

    /// Drop every entry under `pattern` after a source-of-truth write.
    pub async fn invalidate_cache(&self, ctx: &RequestContext, pattern: &str) -> Result<u64, Scoped<CacheError>> {
        self.deadlines.cache(ctx, self.repo.delete_by_pattern(pattern)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::cache::{CacheBackend, InMemoryCache};
    use crate::deadline::DeadlineConfig;

    struct Unreachable;

    #[async_trait]
    impl CacheBackend for Unreachable {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::backend("connection refused"))
        }
        async fn set_ex(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::backend("connection refused"))
        }
        async fn del(&self, _: &[String]) -> Result<u64, CacheError> {
            Err(CacheError::backend("connection refused"))
        }
        async fn scan(&self, _: &str) -> Result<Vec<String>, CacheError> {
            Err(CacheError::backend("connection refused"))
        }
    }

    struct Stalled;

    #[async_trait]
    impl CacheBackend for Stalled {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            std::future::pending().await
        }
        async fn set_ex(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            std::future::pending().await
        }
        async fn del(&self, _: &[String]) -> Result<u64, CacheError> {
            std::future::pending().await
        }
        async fn scan(&self, _: &str) -> Result<Vec<String>, CacheError> {
            std::future::pending().await
        }
    }

    fn aside(backend: Arc<dyn CacheBackend>) -> CacheAside<u32> {
        CacheAside::new(CacheRepository::new(backend), Deadlines::new(DeadlineConfig::default()))
    }

    #[tokio::test]
    async fn read_failure_is_not_a_miss() {
        let out = aside(Arc::new(Unreachable)).read(&RequestContext::background(), "k").await;
        assert!(matches!(out, Err(Scoped::Failed(CacheError::Backend(_)))));
    }

    #[tokio::test]
    async fn warm_failure_is_swallowed() {
        aside(Arc::new(Unreachable))
            .warm_cache(&RequestContext::background(), "k", &[1])
            .await;
    }

    #[tokio::test]
    async fn invalidate_failure_propagates() {
        let out = aside(Arc::new(Unreachable))
            .invalidate_cache(&RequestContext::background(), "users:*")
            .await;
        assert!(matches!(out, Err(Scoped::Failed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out() {
        let out = aside(Arc::new(Stalled)).read(&RequestContext::background(), "k").await;
        assert!(out.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn warm_then_invalidate() {
        let cache = aside(Arc::new(InMemoryCache::new()));
        let ctx = RequestContext::background();

        cache.warm_cache(&ctx, "users:all:size[1]", &[1]).await;
        assert_eq!(cache.read(&ctx, "users:all:size[1]").await.unwrap(), Some(vec![1]));

        assert_eq!(cache.invalidate_cache(&ctx, "users:*").await.unwrap(), 1);
        assert_eq!(cache.read(&ctx, "users:all:size[1]").await.unwrap(), None);
    }
}
