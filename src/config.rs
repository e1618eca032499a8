//! Application configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::dashboard::MAX_STATS_WINDOW_DAYS;
use crate::logger::{LogConfig, dev_log_config, prod_log_config};

/// Passphrase used when `ENCRYPTION_KEY` is unset. Only suitable for local development.
const DEV_ENCRYPTION_KEY: &str = "api-dashboard-development-key";

/// Outbound proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upper bound for the whole upstream exchange, body included
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Reject upstream bodies larger than this; `None` means unbounded
    pub max_response_bytes: Option<usize>,
    /// Refuse destinations on loopback, private and link-local networks
    pub block_private_networks: bool,
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_response_bytes: None,
            block_private_networks: true,
            user_agent: format!("api-dashboard-proxy/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_response_bytes = limit;
        self
    }

    pub fn with_block_private_networks(mut self, block: bool) -> Self {
        self.block_private_networks = block;
        self
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Raw key material; see `SecretCipher::from_config_key`
    pub encryption_key: String,
    pub proxy: ProxyConfig,
    /// Return plaintext secrets from the key endpoints instead of a masked preview
    pub expose_secrets: bool,
    /// Trailing window used by the dashboard statistics
    pub stats_window_days: i64,
    pub secret_cache_ttl: Duration,
    pub secret_cache_capacity: u64,
    pub allowed_origins: Vec<String>,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/app.db".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            encryption_key: DEV_ENCRYPTION_KEY.to_string(),
            proxy: ProxyConfig::default(),
            expose_secrets: false,
            stats_window_days: 30,
            secret_cache_ttl: Duration::from_secs(300),
            secret_cache_capacity: 1000,
            allowed_origins: Vec::new(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid BIND_ADDR: {}", raw))?,
            Err(_) => defaults.bind_addr,
        };

        let encryption_key = env::var("ENCRYPTION_KEY").unwrap_or_else(|_| DEV_ENCRYPTION_KEY.to_string());

        let proxy = ProxyConfig::new()
            .with_request_timeout(Duration::from_secs(env_parse("PROXY_TIMEOUT_SECS", 30)?))
            .with_connect_timeout(Duration::from_secs(env_parse("PROXY_CONNECT_TIMEOUT_SECS", 10)?))
            .with_max_response_bytes(env_optional("PROXY_MAX_RESPONSE_BYTES")?)
            .with_block_private_networks(env_parse("BLOCK_PRIVATE_NETWORKS", true)?);

        // APP_ENV picks the logging preset, individual LOG_* variables override it
        let base_log = match env::var("APP_ENV").as_deref() {
            Ok("production") => prod_log_config(),
            Ok("development") => dev_log_config(),
            _ => defaults.log,
        };
        let log = LogConfig {
            level: env_parse("LOG_LEVEL", base_log.level)?,
            log_dir: env::var("LOG_DIR").unwrap_or(base_log.log_dir),
            json_format: env_parse("LOG_JSON", base_log.json_format)?,
            console_output: env_parse("LOG_CONSOLE", base_log.console_output)?,
            ..base_log
        };

        let stats_window_days = env_parse("STATS_WINDOW_DAYS", defaults.stats_window_days)?;
        validate_stats_window(stats_window_days)?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr,
            encryption_key,
            proxy,
            expose_secrets: env_parse("EXPOSE_SECRETS", false)?,
            stats_window_days,
            secret_cache_ttl: Duration::from_secs(env_parse("SECRET_CACHE_TTL_SECS", 300)?),
            secret_cache_capacity: env_parse("SECRET_CACHE_CAPACITY", defaults.secret_cache_capacity)?,
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            log,
        })
    }

    /// `ENCRYPTION_KEY` was not provided
    pub fn uses_development_key(&self) -> bool {
        self.encryption_key == DEV_ENCRYPTION_KEY
    }
}

fn validate_stats_window(days: i64) -> Result<()> {
    if !(1..=MAX_STATS_WINDOW_DAYS).contains(&days) {
        anyhow::bail!("STATS_WINDOW_DAYS must be between 1 and {}, got {}", MAX_STATS_WINDOW_DAYS, days);
    }
    Ok(())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_optional(name)?.unwrap_or(default))
}

fn env_optional<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={}: {}", name, raw, e)),
        _ => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
