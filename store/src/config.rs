use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::StoreError;

const fn default_pool_size() -> u32 {
    5
}

const fn default_max_overflow() -> u32 {
    10
}

const fn default_recycle_secs() -> u64 {
    3600
}

const fn default_acquire_timeout_secs() -> u64 {
    30
}

const fn default_pre_ping() -> bool {
    true
}

/// Connection pool sizing.
///
/// `pool_size` connections are kept open; up to `max_overflow` more are opened
/// under load and reaped once idle. Callers beyond `pool_size + max_overflow`
/// wait up to `acquire_timeout_secs` for a connection to come back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PoolSettings {
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    #[serde(default = "default_max_overflow")]
    pub max_overflow: u32,

    /// Ping connections before handing them out.
    #[serde(default = "default_pre_ping")]
    pub pre_ping: bool,

    /// Close and reopen connections older than this.
    #[serde(default = "default_recycle_secs")]
    pub recycle_secs: u64,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_overflow: default_max_overflow(),
            pre_ping: default_pre_ping(),
            recycle_secs: default_recycle_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl PoolSettings {
    pub fn capacity(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow)
    }

    pub fn recycle(&self) -> Duration {
        Duration::from_secs(self.recycle_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: PoolSettings,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolSettings::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn backend(&self) -> Result<Backend, StoreError> {
        Backend::from_url(&self.url)
    }

    /// The url with any password replaced, for logs and error messages.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        let Some((userinfo, host)) = rest.split_once('@') else {
            return self.url.clone();
        };
        match userinfo.split_once(':') {
            Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
            None => self.url.clone(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.redacted_url())
            .field("pool", &self.pool)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(StoreError::UnsupportedBackend(scheme.to_string()))
        }
    }

    /// Directory name of this dialect's migration scripts.
    pub fn dir_name(self) -> &'static str {
        match self {
            Backend::Postgres => "postgres",
            Backend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
