//! Infrastructure layer: source-of-truth stores, the cache-aside layer,
//! per-scope deadlines, and transport-backed notification buses.

pub mod cache;
pub mod deadline;
pub mod event_bus;
pub mod policy_store;
pub mod schema;
pub mod store;

pub use cache::{CacheAside, CacheBackend, CacheError, CacheKey, CacheRepository, InMemoryCache};
pub use deadline::{DeadlineConfig, DeadlineExceeded, Deadlines, RequestContext, ScopeKind, Scoped};
pub use policy_store::PostgresPolicyStore;
pub use schema::ensure_schema;
pub use store::{InMemoryUserStore, PostgresUserStore, StoreError, UserFilter, UserStore};
