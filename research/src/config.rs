//! Environment-driven configuration.
//!
//! Values come from the process environment, after a `.env` file in the
//! working directory (if any) has been loaded into it. [`Settings`] covers what
//! the database commands need; [`Config`] adds the LLM and search credentials a
//! research run requires.

use std::fmt;
use std::path::PathBuf;

use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use store::{DatabaseConfig, PoolSettings};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

const KEYS: &[&str] = &[
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "LLM_PROVIDER",
    "LLM_MODEL",
    "LLM_BASE_URL",
    "TAVILY_API_KEY",
    "COMPANY_CERT_PATH",
    "DATABASE_URL",
    "DB_POOL_SIZE",
    "DB_MAX_OVERFLOW",
    "DB_POOL_RECYCLE_SECS",
    "DB_POOL_TIMEOUT_SECS",
    "LANGFUSE_ENABLED",
    "LANGFUSE_PUBLIC_KEY",
    "LANGFUSE_SECRET_KEY",
    "LANGFUSE_HOST",
    "LANGFUSE_RELEASE",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    #[error("LLM_PROVIDER must be 'anthropic' or 'openai', got {0:?}")]
    UnknownProvider(String),

    #[error("invalid configuration value: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}

/// Raw environment, keys lowercased by the provider.
#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    anthropic_api_key: Option<String>,
    openai_api_key: Option<String>,
    llm_provider: Option<String>,
    llm_model: Option<String>,
    llm_base_url: Option<String>,
    tavily_api_key: Option<String>,
    company_cert_path: Option<PathBuf>,
    database_url: Option<String>,
    db_pool_size: Option<u32>,
    db_max_overflow: Option<u32>,
    db_pool_recycle_secs: Option<u64>,
    db_pool_timeout_secs: Option<u64>,
    langfuse_enabled: Option<bool>,
    langfuse_public_key: Option<String>,
    langfuse_secret_key: Option<String>,
    langfuse_host: Option<String>,
    langfuse_release: Option<String>,
}

/// Treat empty and whitespace-only values as unset.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The environment provider restricted to the keys this application reads.
pub fn figment() -> Figment {
    Figment::from(Env::raw().only(KEYS))
}

/// Load `.env` into the process environment, returning the file read. A
/// missing file is not an error. Variables already set are kept.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(err) if err.not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    OpenAI,
}

impl LlmProvider {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(LlmProvider::Anthropic),
            "openai" => Ok(LlmProvider::OpenAI),
            _ => Err(ConfigError::UnknownProvider(raw.to_string())),
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
        }
    }

    /// OpenAI-compatible chat completions endpoint.
    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com/v1",
            LlmProvider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAI => "openai",
        })
    }
}

#[derive(Clone)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct LangfuseSettings {
    pub enabled: bool,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
    pub host: String,
    pub release: Option<String>,
}

impl LangfuseSettings {
    /// Enabled and both keys present.
    pub fn is_active(&self) -> bool {
        self.enabled && self.public_key.is_some() && self.secret_key.is_some()
    }
}

impl fmt::Debug for LangfuseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LangfuseSettings")
            .field("enabled", &self.enabled)
            .field("public_key", &self.public_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("release", &self.release)
            .finish()
    }
}

/// Settings that never require LLM or search credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: Option<DatabaseConfig>,
    pub cert_path: Option<PathBuf>,
    pub langfuse: LangfuseSettings,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&figment())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let raw: RawEnv = figment.extract()?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawEnv) -> Self {
        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            pool_size: raw.db_pool_size.unwrap_or(defaults.pool_size),
            max_overflow: raw.db_max_overflow.unwrap_or(defaults.max_overflow),
            recycle_secs: raw.db_pool_recycle_secs.unwrap_or(defaults.recycle_secs),
            acquire_timeout_secs: raw
                .db_pool_timeout_secs
                .unwrap_or(defaults.acquire_timeout_secs),
            ..defaults
        };
        let database = present(raw.database_url).map(|url| DatabaseConfig::new(url).with_pool(pool));

        let cert_path = raw.company_cert_path.filter(|path| {
            if path.as_os_str().is_empty() {
                return false;
            }
            if !path.exists() {
                warn!(
                    path = %path.display(),
                    "COMPANY_CERT_PATH does not exist, continuing without it"
                );
                return false;
            }
            true
        });

        let langfuse = LangfuseSettings {
            enabled: raw.langfuse_enabled.unwrap_or(false),
            public_key: present(raw.langfuse_public_key),
            secret_key: present(raw.langfuse_secret_key),
            host: present(raw.langfuse_host)
                .map(|h| h.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.to_string()),
            release: present(raw.langfuse_release),
        };

        Self {
            database,
            cert_path,
            langfuse,
        }
    }

    pub fn has_database(&self) -> bool {
        self.database.is_some()
    }

    /// The database commands cannot do anything without `DATABASE_URL`.
    pub fn require_database(&self) -> Result<&DatabaseConfig, ConfigError> {
        self.database
            .as_ref()
            .ok_or_else(|| ConfigError::MissingCredentials(vec!["DATABASE_URL"]))
    }
}

/// Everything a research run needs.
#[derive(Clone)]
pub struct Config {
    pub llm: LlmSettings,
    pub tavily_api_key: String,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(&figment())
    }

    /// Fails with every missing required key at once.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let mut raw: RawEnv = figment.extract()?;

        let anthropic = present(raw.anthropic_api_key.take());
        let openai = present(raw.openai_api_key.take());
        let tavily = present(raw.tavily_api_key.take());
        let provider = present(raw.llm_provider.take())
            .map(|p| LlmProvider::parse(&p))
            .transpose()?;

        let llm_key = match provider {
            Some(LlmProvider::Anthropic) => anthropic.map(|k| (LlmProvider::Anthropic, k)),
            Some(LlmProvider::OpenAI) => openai.map(|k| (LlmProvider::OpenAI, k)),
            None => anthropic
                .map(|k| (LlmProvider::Anthropic, k))
                .or_else(|| openai.map(|k| (LlmProvider::OpenAI, k))),
        };

        let mut missing = Vec::new();
        if llm_key.is_none() {
            missing.push(match provider {
                Some(LlmProvider::Anthropic) => "ANTHROPIC_API_KEY",
                Some(LlmProvider::OpenAI) => "OPENAI_API_KEY",
                None => "ANTHROPIC_API_KEY or OPENAI_API_KEY",
            });
        }
        if tavily.is_none() {
            missing.push("TAVILY_API_KEY");
        }

        let (Some((provider, api_key)), Some(tavily_api_key)) = (llm_key, tavily) else {
            return Err(ConfigError::MissingCredentials(missing));
        };

        let llm = LlmSettings {
            provider,
            api_key,
            model: present(raw.llm_model.take())
                .unwrap_or_else(|| provider.default_model().to_string()),
            base_url: present(raw.llm_base_url.take())
                .unwrap_or_else(|| provider.default_base_url().to_string()),
        };

        Ok(Self {
            llm,
            tavily_api_key,
            settings: Settings::from_raw(raw),
        })
    }

    pub fn has_database(&self) -> bool {
        self.settings.has_database()
    }

    pub fn has_certificate(&self) -> bool {
        self.settings.cert_path.is_some()
    }

    pub fn tracing_active(&self) -> bool {
        self.settings.langfuse.is_active()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("llm", &self.llm)
            .field("tavily_api_key", &"***")
            .field("settings", &self.settings)
            .finish()
    }
}
