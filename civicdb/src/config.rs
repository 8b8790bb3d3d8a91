//! Runtime settings.
//!
//! Read from a TOML file, then overridden from the environment:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `DATABASE_URL` | `database.url` |
//! | `REDIS_URL` | `redis.url` |
//! | `CIVICDB_CACHE_TTL_SECS` | `cache.time_to_live_secs` |

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

const DEFAULT_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_LOCK_WAIT_SECS: u64 = 5;
const DEFAULT_LOCK_LEASE_SECS: u64 = 10;
const DEFAULT_LOCK_RETRY_MS: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub lock: LockSettings,
    pub schema: SchemaSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/civic".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    pub key_prefix: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".to_string(),
            key_prefix: "civic".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Expiry of a cached table hash, refreshed on every write.
    pub time_to_live_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            time_to_live_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheSettings {
    pub fn time_to_live(&self) -> Duration {
        Duration::from_secs(self.time_to_live_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// How long `lock_records` keeps retrying before giving up.
    pub wait_secs: u64,
    /// Auto-release time of an acquired lock.
    pub lease_secs: u64,
    pub retry_interval_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            wait_secs: DEFAULT_LOCK_WAIT_SECS,
            lease_secs: DEFAULT_LOCK_LEASE_SECS,
            retry_interval_ms: DEFAULT_LOCK_RETRY_MS,
        }
    }
}

impl LockSettings {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub central_instance: bool,
    pub state_schema_index: usize,
    pub default_schema: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Approximate cap on each topic stream's length; unbounded when unset.
    pub max_len: Option<usize>,
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Settings = toml::from_str(&raw)?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(raw) = lookup("CIVICDB_CACHE_TTL_SECS") {
            self.cache.time_to_live_secs = raw.trim().parse().map_err(|err| ConfigError::Invalid {
                key: "cache.time_to_live_secs",
                message: format!("{raw:?}: {err}"),
            })?;
        }
        Ok(())
    }

    /// A copy safe to log or print: connection passwords are masked.
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        settings.database.url = redact_url(&settings.database.url);
        settings.redis.url = redact_url(&settings.redis.url);
        settings
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("database.url", &self.database.url, &["postgres", "postgresql"])?;
        check_url("redis.url", &self.redis.url, &["redis", "rediss"])?;
        if self.cache.time_to_live_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "cache.time_to_live_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.lock.lease_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "lock.lease_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.lock.retry_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "lock.retry_interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// `raw` with any password replaced by `***`; unparsable input is hidden entirely.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return "***".to_string();
    };
    if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
        return "***".to_string();
    }
    parsed.to_string()
}

fn check_url(key: &'static str, raw: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|err| ConfigError::Invalid {
        key,
        message: err.to_string(),
    })?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ConfigError::Invalid {
            key,
            message: format!("unsupported scheme `{}`, expected one of {schemes:?}", parsed.scheme()),
        });
    }
    Ok(())
}
