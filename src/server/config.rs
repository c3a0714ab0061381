use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::server::sampler::SamplerConfig;
use crate::services::{QueryConfig, MAX_OFFSET};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub listen_address: String,
    /// PostgreSQL URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    /// Redis URL; the in-memory cache is used when unset.
    pub redis_url: Option<String>,
    pub cache_key: String,
    pub cache_ttl_seconds: u64,
    pub page_size: u64,
    pub max_page_size: u64,
    pub tick_interval_seconds: u64,
    pub log_dir: String,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAppConfig {
    listen_address: Option<String>,
    database_url: Option<String>,
    redis_url: Option<String>,
    cache_key: Option<String>,
    cache_ttl_seconds: Option<u64>,
    page_size: Option<u64>,
    max_page_size: Option<u64>,
    tick_interval_seconds: Option<u64>,
    log_dir: Option<String>,
    cors_allowed_origins: Option<String>,
}

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_cache_key() -> String {
    "last_sample".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

const DEFAULT_CACHE_TTL_SECONDS: u64 = 5 * 60;
const DEFAULT_PAGE_SIZE: u64 = 10;
const DEFAULT_MAX_PAGE_SIZE: u64 = 100;
const DEFAULT_TICK_INTERVAL_SECONDS: u64 = 60;

impl AppConfig {
    /// Loads `.env`, then the optional TOML file, then `SAMPLER_*` environment
    /// variables. Environment values override file values.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let path = Path::new(path_str);
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            _ => PartialAppConfig::default(),
        };

        // 2. Load from environment variables
        let mut env_config: PartialAppConfig = envy::prefixed("SAMPLER_").from_env()?;
        if env_config.database_url.is_none() {
            env_config.database_url = std::env::var("DATABASE_URL").ok();
        }

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    fn merge(file: PartialAppConfig, env: PartialAppConfig) -> Result<Self, ConfigError> {
        let config = AppConfig {
            listen_address: env
                .listen_address
                .or(file.listen_address)
                .unwrap_or_else(default_listen_address),
            database_url: env.database_url.or(file.database_url),
            redis_url: env.redis_url.or(file.redis_url),
            cache_key: env
                .cache_key
                .or(file.cache_key)
                .unwrap_or_else(default_cache_key),
            cache_ttl_seconds: env
                .cache_ttl_seconds
                .or(file.cache_ttl_seconds)
                .unwrap_or(DEFAULT_CACHE_TTL_SECONDS),
            page_size: env
                .page_size
                .or(file.page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            max_page_size: env
                .max_page_size
                .or(file.max_page_size)
                .unwrap_or(DEFAULT_MAX_PAGE_SIZE),
            tick_interval_seconds: env
                .tick_interval_seconds
                .or(file.tick_interval_seconds)
                .unwrap_or(DEFAULT_TICK_INTERVAL_SECONDS),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            cors_allowed_origins: env
                .cors_allowed_origins
                .or(file.cors_allowed_origins)
                .map(|origins| {
                    origins
                        .split(',')
                        .map(str::trim)
                        .filter(|origin| !origin.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        if self.max_page_size < self.page_size {
            return Err(ConfigError::Invalid(format!(
                "max_page_size ({}) must not be smaller than page_size ({})",
                self.max_page_size, self.page_size
            )));
        }
        if self.max_page_size > MAX_OFFSET {
            return Err(ConfigError::Invalid(format!(
                "max_page_size must not exceed {MAX_OFFSET}"
            )));
        }
        if self.tick_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.cache_key.is_empty() {
            return Err(ConfigError::Invalid("cache_key must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            cache_key: self.cache_key.clone(),
            tick_interval: Duration::from_secs(self.tick_interval_seconds),
        }
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            cache_key: self.cache_key.clone(),
            page_size: self.page_size,
            max_page_size: self.max_page_size,
        }
    }
}
