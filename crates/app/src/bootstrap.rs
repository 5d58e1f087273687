//! Process wiring: builds every collaborator once and hands them to the
//! services by `Arc`. [`Bootstrap::shutdown`] releases pooled connections.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{info, warn};

use warden_auth::{
    Argon2Hasher, Enforcer, InMemoryPolicyStore, PasswordHasher, PolicyError, PolicyStore,
    TokenError, Tokens, engine_for,
};
use warden_core::UserView;
use warden_events::{EventBus, InMemoryEventBus, Notification, PublishError};
use warden_infra::cache::{CacheBackend, CacheError, InMemoryCache};
use warden_infra::{
    CacheAside, CacheRepository, Deadlines, InMemoryUserStore, PostgresPolicyStore,
    PostgresUserStore, StoreError, UserStore, ensure_schema,
};

use crate::auth::AuthService;
use crate::builder::BuildError;
use crate::settings::{Settings, SettingsError};
use crate::users::UsersService;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("token configuration: {0}")]
    Token(#[from] TokenError),

    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("database connection failed: {0}")]
    Database(String),

    #[error("schema setup failed: {0}")]
    Schema(#[from] StoreError),

    #[error("policy load failed: {0}")]
    Policy(#[from] PolicyError),

    #[error("cache backend unavailable: {0}")]
    Cache(#[from] CacheError),

    #[error("notification bus unavailable: {0}")]
    Bus(#[from] PublishError),

    #[error("service wiring: {0}")]
    Build(#[from] BuildError),
}

pub struct Bootstrap {
    pub auth: Arc<AuthService>,
    pub users: Arc<UsersService>,
    pub enforcer: Arc<Enforcer>,
    pub bus: Arc<dyn EventBus<Notification>>,
    pub deadlines: Deadlines,
    pool: Option<Arc<PgPool>>,
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("auth", &self.auth)
            .field("users", &self.users)
            .field("persistent", &self.pool.is_some())
            .finish_non_exhaustive()
    }
}

impl Bootstrap {
    pub async fn from_settings(settings: &Settings) -> Result<Self, BootstrapError> {
        // Keys first: an undersized secret must stop startup before any IO.
        let keys = settings.token.key_set()?;
        let tokens = Tokens::new(
            engine_for(settings.token.scheme, settings.token.issuer.clone()),
            keys,
            settings.token.ttls()?,
        );
        let deadlines = Deadlines::new(settings.timeouts.deadline_config());

        let (pool, users, policy_store) = match &settings.database.url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(settings.database.max_connections)
                    .acquire_timeout(deadlines.config().database)
                    .connect(url)
                    .await
                    .map_err(|e| BootstrapError::Database(e.to_string()))?;
                ensure_schema(&pool).await?;
                let pool = Arc::new(pool);
                let users: Arc<dyn UserStore> = Arc::new(PostgresUserStore::new(pool.clone()));
                let policy: Arc<dyn PolicyStore> = Arc::new(PostgresPolicyStore::new(pool.clone()));
                info!(max_connections = settings.database.max_connections, "postgres store ready");
                (Some(pool), users, policy)
            }
            None => {
                warn!("no database url configured; using in-memory stores");
                let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
                let policy: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
                (None, users, policy)
            }
        };

        let (cache_backend, bus) = connect_redis(settings).await?;

        let enforcer = Arc::new(Enforcer::new(policy_store).await?);
        let cache: CacheAside<UserView> = CacheAside::new(
            CacheRepository::with_ttl(cache_backend, settings.cache.ttl()),
            deadlines,
        );
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher::new());

        let auth = AuthService::builder()
            .users(users.clone())
            .enforcer(enforcer.clone())
            .tokens(tokens)
            .hasher(hasher.clone())
            .bus(bus.clone())
            .cache(cache.clone())
            .deadlines(deadlines)
            .build()?;

        let users = UsersService::builder()
            .users(users)
            .cache(cache)
            .hasher(hasher)
            .deadlines(deadlines)
            .build()?;

        info!(scheme = ?settings.token.scheme, "services wired");
        Ok(Self {
            auth: Arc::new(auth),
            users: Arc::new(users),
            enforcer,
            bus,
            deadlines,
            pool,
        })
    }

    /// Close pooled connections. In-flight calls finish first.
    pub async fn shutdown(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
            info!("postgres pool closed");
        }
        info!("shutdown complete");
    }
}

type Transports = (Arc<dyn CacheBackend>, Arc<dyn EventBus<Notification>>);

#[cfg(feature = "redis")]
async fn connect_redis(settings: &Settings) -> Result<Transports, BootstrapError> {
    use warden_infra::cache::RedisCache;
    use warden_infra::event_bus::RedisPubSubEventBus;

    match &settings.redis.url {
        Some(url) => {
            let cache: Arc<dyn CacheBackend> = Arc::new(RedisCache::connect(url).await?);
            let bus: Arc<dyn EventBus<Notification>> =
                Arc::new(RedisPubSubEventBus::connect(url, settings.redis.channel.clone()).await?);
            info!(channel = %settings.redis.channel, "redis cache and bus ready");
            Ok((cache, bus))
        }
        None => Ok(in_memory_transports()),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(settings: &Settings) -> Result<Transports, BootstrapError> {
    if settings.redis.url.is_some() {
        warn!("redis url configured but the `redis` feature is disabled; using in-memory cache");
    }
    Ok(in_memory_transports())
}

fn in_memory_transports() -> Transports {
    let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
    let bus: Arc<dyn EventBus<Notification>> = Arc::new(InMemoryEventBus::<Notification>::new());
    (cache, bus)
}
