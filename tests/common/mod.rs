#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use api_dashboard::config::{AppConfig, ProxyConfig};
use api_dashboard::dao::api_key::SecretCipher;
use api_dashboard::dao::{init_db, init_sqlite_pool};
use api_dashboard::proxy::{ProxyClient, ProxyExecutor};
use api_dashboard::stores::{
    CredentialStore, RateLimitStore, RequestLogStore, SqliteCredentialStore, SqliteRateLimitStore,
    SqliteRequestLogStore,
};
use api_dashboard::web::AppState;
use sqlx::SqlitePool;

pub const OWNER: &str = "user-1";
pub const OTHER_OWNER: &str = "user-2";

/// Fresh in-memory database with the schema applied
pub async fn setup_pool() -> SqlitePool {
    let pool = init_sqlite_pool("sqlite::memory:").await.expect("open in-memory database");
    init_db(&pool).await.expect("DB init failed");
    pool
}

pub fn test_cipher() -> SecretCipher {
    SecretCipher::from_config_key("integration-test-key")
}

pub struct Stores {
    pub credentials: Arc<SqliteCredentialStore>,
    pub logs: Arc<SqliteRequestLogStore>,
    pub rate_limits: Arc<SqliteRateLimitStore>,
}

impl Stores {
    pub async fn new() -> Self {
        let pool = setup_pool().await;
        Self {
            credentials: Arc::new(SqliteCredentialStore::new(pool.clone(), test_cipher())),
            logs: Arc::new(SqliteRequestLogStore::new(pool.clone())),
            rate_limits: Arc::new(SqliteRateLimitStore::new(pool)),
        }
    }

    pub fn credentials(&self) -> Arc<dyn CredentialStore> {
        self.credentials.clone()
    }

    pub fn logs(&self) -> Arc<dyn RequestLogStore> {
        self.logs.clone()
    }

    pub fn rate_limits(&self) -> Arc<dyn RateLimitStore> {
        self.rate_limits.clone()
    }
}

/// Proxy settings for tests: mockito listens on loopback, so destination filtering is off
pub fn test_proxy_config() -> ProxyConfig {
    ProxyConfig::new()
        .with_request_timeout(Duration::from_secs(5))
        .with_block_private_networks(false)
}

pub fn executor(stores: &Stores, config: ProxyConfig) -> ProxyExecutor {
    let client = ProxyClient::new(config).expect("build proxy client");
    ProxyExecutor::new(client, stores.credentials(), stores.logs(), stores.rate_limits())
}

pub fn test_app_config() -> AppConfig {
    AppConfig {
        proxy: test_proxy_config(),
        ..AppConfig::default()
    }
}

pub fn app_state(stores: &Stores, config: &AppConfig) -> AppState {
    let client = ProxyClient::new(config.proxy.clone()).expect("build proxy client");
    AppState::new(
        stores.credentials(),
        stores.logs(),
        stores.rate_limits(),
        client,
        config,
    )
}
