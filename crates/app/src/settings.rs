//! Runtime configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. `warden.toml` (or the path passed to [`Settings::load`]), if present
//! 3. environment variables, e.g. `WARDEN__TOKEN__SECRETS__ACCESS=...`

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use warden_auth::{SecretKey, SecretKeySet, TokenError, TokenScheme, TokenTtls};
use warden_infra::DeadlineConfig;
use warden_observability::LogSettings;

pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";
pub const ENV_PREFIX: &str = "WARDEN";

/// Upper bound for every configured TTL (token and cache): one year.
pub const MAX_TTL_SECS: i64 = 366 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub token: TokenSettings,
    pub timeouts: TimeoutSettings,
    pub cache: CacheSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    pub scheme: TokenScheme,
    pub issuer: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub reset_ttl_secs: i64,
    pub secrets: SecretSettings,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            scheme: TokenScheme::Jwt,
            issuer: "warden".to_owned(),
            access_ttl_secs: 5 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            reset_ttl_secs: 15 * 60,
            secrets: SecretSettings::default(),
        }
    }
}

impl TokenSettings {
    pub fn ttls(&self) -> Result<TokenTtls, SettingsError> {
        Ok(TokenTtls {
            access: ttl_delta("token.access_ttl_secs", self.access_ttl_secs)?,
            refresh: ttl_delta("token.refresh_ttl_secs", self.refresh_ttl_secs)?,
            reset: ttl_delta("token.reset_ttl_secs", self.reset_ttl_secs)?,
        })
    }

    /// Fails closed when any secret is shorter than the minimum key length.
    pub fn key_set(&self) -> Result<SecretKeySet, TokenError> {
        SecretKeySet::new(
            SecretKey::new(self.secrets.access.as_bytes()),
            SecretKey::new(self.secrets.refresh.as_bytes()),
            SecretKey::new(self.secrets.reset.as_bytes()),
        )
    }
}

/// Raw secrets as configured. Never printed.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecretSettings {
    pub access: String,
    pub refresh: String,
    pub reset: String,
}

impl std::fmt::Debug for SecretSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretSettings([REDACTED])")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub cache_ms: u64,
    pub database_ms: u64,
    pub downstream_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            cache_ms: 2_000,
            database_ms: 5_000,
            downstream_ms: 5_000,
        }
    }
}

impl TimeoutSettings {
    pub fn deadline_config(&self) -> DeadlineConfig {
        DeadlineConfig {
            cache: Duration::from_millis(self.cache_ms),
            database: Duration::from_millis(self.database_ms),
            downstream: Duration::from_millis(self.downstream_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 30 * 60 }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Without a url the in-memory store is used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Without a url the in-memory cache and bus are used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: Option<String>,
    pub channel: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            channel: "warden:notifications".to_owned(),
        }
    }
}

impl Settings {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`]) plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut builder = Config::builder();
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let ttls = [
            ("token.access_ttl_secs", self.token.access_ttl_secs),
            ("token.refresh_ttl_secs", self.token.refresh_ttl_secs),
            ("token.reset_ttl_secs", self.token.reset_ttl_secs),
        ];
        for (field, secs) in ttls {
            check_ttl(field, secs)?;
        }
        let cache_secs = i64::try_from(self.cache.ttl_secs).unwrap_or(i64::MAX);
        check_ttl("cache.ttl_secs", cache_secs)?;
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid {
                field: "database.max_connections",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

fn check_ttl(field: &'static str, secs: i64) -> Result<(), SettingsError> {
    if (1..=MAX_TTL_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            field,
            reason: format!("must be between 1 and {MAX_TTL_SECS} seconds, got {secs}"),
        })
    }
}

fn ttl_delta(field: &'static str, secs: i64) -> Result<chrono::TimeDelta, SettingsError> {
    check_ttl(field, secs)?;
    chrono::TimeDelta::try_seconds(secs).ok_or_else(|| SettingsError::Invalid {
        field,
        reason: "out of range".into(),
    })
}

/// Load `.env` if present. A missing file is not an error.
///
/// Runs before the subscriber exists, so problems go to stderr.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }
}
