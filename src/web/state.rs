use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::dao::api_key::SecretCipher;
use crate::dashboard::DashboardAggregator;
use crate::proxy::{ProxyClient, ProxyError, ProxyExecutor};
use crate::stores::{
    CredentialStore, RateLimitStore, RequestLogStore, SqliteCredentialStore, SqliteRateLimitStore,
    SqliteRequestLogStore,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub logs: Arc<dyn RequestLogStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub executor: ProxyExecutor,
    pub dashboard: DashboardAggregator,
    /// Return plaintext secrets from the key endpoints
    pub expose_secrets: bool,
}

impl AppState {
    /// Wire the given stores into an executor and an aggregator
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        logs: Arc<dyn RequestLogStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        client: ProxyClient,
        config: &AppConfig,
    ) -> Self {
        let executor = ProxyExecutor::new(client, credentials.clone(), logs.clone(), rate_limits.clone());
        let dashboard = DashboardAggregator::new(
            credentials.clone(),
            logs.clone(),
            rate_limits.clone(),
            config.stats_window_days,
        );
        Self {
            credentials,
            logs,
            rate_limits,
            executor,
            dashboard,
            expose_secrets: config.expose_secrets,
        }
    }

    /// SQLite-backed state
    pub fn from_pool(pool: SqlitePool, config: &AppConfig) -> Result<Self, ProxyError> {
        let cipher = SecretCipher::from_config_key(&config.encryption_key);
        let credentials = Arc::new(SqliteCredentialStore::with_cache(
            pool.clone(),
            cipher,
            config.secret_cache_ttl,
            config.secret_cache_capacity,
        ));
        let logs = Arc::new(SqliteRequestLogStore::new(pool.clone()));
        let rate_limits = Arc::new(SqliteRateLimitStore::new(pool));
        let client = ProxyClient::new(config.proxy.clone())?;

        Ok(Self::new(credentials, logs, rate_limits, client, config))
    }
}
