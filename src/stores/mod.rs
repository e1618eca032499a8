//! Repository traits for keys, request logs and rate-limit snapshots.
//!
//! Everything above this layer holds `Arc<dyn ...Store>`; the SQLite
//! implementations live in [`sqlite`].

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::dao::api_key::{ApiKeyRecord, CryptoError};
use crate::dao::rate_limit::RateLimitSnapshot;
use crate::dao::request_log::{RequestLogEntry, RequestLogSummary};

pub mod sqlite;

pub use sqlite::{SqliteCredentialStore, SqliteRateLimitStore, SqliteRequestLogStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Input for a new key
#[derive(Clone)]
pub struct NewApiKey {
    pub api_name: String,
    pub secret: String,
    pub header_name: Option<String>,
}

impl fmt::Debug for NewApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewApiKey")
            .field("api_name", &self.api_name)
            .field("secret", &"<redacted>")
            .field("header_name", &self.header_name)
            .finish()
    }
}

/// Partial update. `header_name: Some("")` resets injection to the bearer default.
#[derive(Clone, Default)]
pub struct ApiKeyPatch {
    pub api_name: Option<String>,
    pub secret: Option<String>,
    pub header_name: Option<String>,
}

impl fmt::Debug for ApiKeyPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyPatch")
            .field("api_name", &self.api_name)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("header_name", &self.header_name)
            .finish()
    }
}

/// A key together with its decrypted secret
#[derive(Clone)]
pub struct RevealedKey {
    pub record: ApiKeyRecord,
    pub secret: String,
}

impl fmt::Debug for RevealedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedKey")
            .field("id", &self.record.id)
            .field("api_name", &self.record.api_name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Normalized rate-limit observation, independent of the provider's header family
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitFragment {
    pub remaining: i64,
    pub limit: i64,
    pub reset_time: Option<DateTime<Utc>>,
    /// Becomes the snapshot's `last_updated`
    pub observed_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create(&self, owner_id: &str, new_key: NewApiKey) -> StoreResult<ApiKeyRecord>;

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<ApiKeyRecord>>;

    async fn get(&self, owner_id: &str, id: &str) -> StoreResult<ApiKeyRecord>;

    async fn update(&self, owner_id: &str, id: &str, patch: ApiKeyPatch) -> StoreResult<ApiKeyRecord>;

    /// Returns the removed record
    async fn delete(&self, owner_id: &str, id: &str) -> StoreResult<ApiKeyRecord>;

    async fn count(&self, owner_id: &str) -> StoreResult<i64>;

    /// Decrypt a key's secret for injection into an outbound request
    async fn reveal_secret(&self, owner_id: &str, id: &str) -> StoreResult<RevealedKey>;
}

#[async_trait]
pub trait RequestLogStore: Send + Sync {
    async fn append(&self, entry: &RequestLogEntry) -> StoreResult<()>;

    /// Newest first
    async fn list(&self, owner_id: &str, limit: i64, offset: i64) -> StoreResult<Vec<RequestLogEntry>>;

    async fn summarize(&self, owner_id: &str, since: DateTime<Utc>) -> StoreResult<RequestLogSummary>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Last write wins
    async fn upsert(
        &self,
        owner_id: &str,
        api_name: &str,
        fragment: &RateLimitFragment,
    ) -> StoreResult<RateLimitSnapshot>;

    async fn get(&self, owner_id: &str, api_name: &str) -> StoreResult<Option<RateLimitSnapshot>>;

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<RateLimitSnapshot>>;

    /// `true` when a snapshot existed
    async fn delete(&self, owner_id: &str, api_name: &str) -> StoreResult<bool>;
}
