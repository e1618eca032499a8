use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderName;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dao::api_key::{self, ApiKeyRecord, SecretCipher, mask_secret};
use crate::dao::cache::CacheService;
use crate::dao::rate_limit::{self, RateLimitSnapshot};
use crate::dao::request_log::{self, RequestLogEntry, RequestLogSummary};

use super::{
    ApiKeyPatch, CredentialStore, NewApiKey, RateLimitFragment, RateLimitStore, RequestLogStore,
    RevealedKey, StoreError, StoreResult,
};

fn key_not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        resource: "api key",
        id: id.to_string(),
    }
}

fn validate_api_name(api_name: &str) -> StoreResult<String> {
    let name = api_name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("api_name cannot be empty".to_string()));
    }
    Ok(name.to_string())
}

fn validate_secret(secret: &str) -> StoreResult<()> {
    if secret.trim().is_empty() {
        return Err(StoreError::Invalid("api key cannot be empty".to_string()));
    }
    Ok(())
}

/// Blank means "use the bearer default"
fn normalize_header_name(header_name: Option<&str>) -> StoreResult<Option<String>> {
    match header_name.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| StoreError::Invalid(format!("invalid header name: {}", name)))?;
            Ok(Some(name.to_string()))
        }
    }
}

/// Keys in SQLite, secrets sealed with AES-256-GCM.
///
/// Decrypted secrets are cached by key id. The owner check always hits the
/// database, only the decryption is skipped on a cache hit.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
    cipher: SecretCipher,
    secrets: CacheService<String, String>,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool, cipher: SecretCipher) -> Self {
        Self::with_cache(pool, cipher, Duration::from_secs(300), 1000)
    }

    pub fn with_cache(pool: SqlitePool, cipher: SecretCipher, ttl: Duration, capacity: u64) -> Self {
        Self {
            pool,
            cipher,
            secrets: CacheService::new(ttl, capacity),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn create(&self, owner_id: &str, new_key: NewApiKey) -> StoreResult<ApiKeyRecord> {
        let api_name = validate_api_name(&new_key.api_name)?;
        validate_secret(&new_key.secret)?;
        let header_name = normalize_header_name(new_key.header_name.as_deref())?;

        let (key_hash, encrypted_key_value) = self.cipher.seal(&new_key.secret)?;
        let now = Utc::now();
        let record = ApiKeyRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            api_name,
            key_hash,
            encrypted_key_value,
            key_preview: mask_secret(&new_key.secret),
            header_name,
            created_at: now,
            updated_at: now,
        };

        api_key::create_api_key(&self.pool, &record).await?;
        info!(owner_id = %owner_id, key_id = %record.id, api_name = %record.api_name, "API key created");
        Ok(record)
    }

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<ApiKeyRecord>> {
        Ok(api_key::list_api_keys(&self.pool, owner_id).await?)
    }

    async fn get(&self, owner_id: &str, id: &str) -> StoreResult<ApiKeyRecord> {
        api_key::get_api_key(&self.pool, owner_id, id)
            .await?
            .ok_or_else(|| key_not_found(id))
    }

    async fn update(&self, owner_id: &str, id: &str, patch: ApiKeyPatch) -> StoreResult<ApiKeyRecord> {
        let mut record = self.get(owner_id, id).await?;

        if let Some(api_name) = patch.api_name.as_deref() {
            record.api_name = validate_api_name(api_name)?;
        }
        if let Some(header_name) = patch.header_name.as_deref() {
            record.header_name = normalize_header_name(Some(header_name))?;
        }
        if let Some(secret) = patch.secret.as_deref() {
            validate_secret(secret)?;
            let (key_hash, encrypted_key_value) = self.cipher.seal(secret)?;
            record.key_hash = key_hash;
            record.encrypted_key_value = encrypted_key_value;
            record.key_preview = mask_secret(secret);
        }
        record.updated_at = Utc::now();

        let rows = api_key::update_api_key(&self.pool, &record).await?;
        if rows == 0 {
            return Err(key_not_found(id));
        }
        self.secrets.invalidate(&record.id).await;

        info!(owner_id = %owner_id, key_id = %id, "API key updated");
        Ok(record)
    }

    async fn delete(&self, owner_id: &str, id: &str) -> StoreResult<ApiKeyRecord> {
        let record = self.get(owner_id, id).await?;
        let rows = api_key::delete_api_key(&self.pool, owner_id, id).await?;
        if rows == 0 {
            return Err(key_not_found(id));
        }
        self.secrets.invalidate(&record.id).await;

        info!(owner_id = %owner_id, key_id = %id, api_name = %record.api_name, "API key deleted");
        Ok(record)
    }

    async fn count(&self, owner_id: &str) -> StoreResult<i64> {
        Ok(api_key::count_api_keys(&self.pool, owner_id).await?)
    }

    async fn reveal_secret(&self, owner_id: &str, id: &str) -> StoreResult<RevealedKey> {
        let record = self.get(owner_id, id).await?;

        if let Some(secret) = self.secrets.get(&record.id).await {
            debug!(key_id = %id, "Secret cache hit");
            return Ok(RevealedKey { record, secret });
        }

        let secret = self.cipher.open(&record.encrypted_key_value, &record.key_hash)?;
        self.secrets.insert(record.id.clone(), secret.clone()).await;
        Ok(RevealedKey { record, secret })
    }
}

/// Append-only request log in SQLite
#[derive(Debug, Clone)]
pub struct SqliteRequestLogStore {
    pool: SqlitePool,
}

impl SqliteRequestLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestLogStore for SqliteRequestLogStore {
    async fn append(&self, entry: &RequestLogEntry) -> StoreResult<()> {
        request_log::create_request_log(&self.pool, entry).await?;
        Ok(())
    }

    async fn list(&self, owner_id: &str, limit: i64, offset: i64) -> StoreResult<Vec<RequestLogEntry>> {
        Ok(request_log::list_request_logs_paginated(&self.pool, owner_id, limit.max(0), offset.max(0)).await?)
    }

    async fn summarize(&self, owner_id: &str, since: DateTime<Utc>) -> StoreResult<RequestLogSummary> {
        Ok(request_log::get_request_log_summary(&self.pool, owner_id, &since).await?)
    }
}

/// Current rate-limit state per (owner, api name) in SQLite
#[derive(Debug, Clone)]
pub struct SqliteRateLimitStore {
    pool: SqlitePool,
}

impl SqliteRateLimitStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for SqliteRateLimitStore {
    async fn upsert(
        &self,
        owner_id: &str,
        api_name: &str,
        fragment: &RateLimitFragment,
    ) -> StoreResult<RateLimitSnapshot> {
        let snapshot = RateLimitSnapshot {
            owner_id: owner_id.to_string(),
            api_name: validate_api_name(api_name)?,
            remaining: fragment.remaining,
            limit: fragment.limit,
            reset_time: fragment.reset_time,
            last_updated: fragment.observed_at,
        };
        let purged = rate_limit::delete_expired_rate_limits(&self.pool, &Utc::now()).await?;
        if purged > 0 {
            debug!(purged, "Expired rate limit snapshots removed");
        }
        rate_limit::upsert_rate_limit(&self.pool, &snapshot).await?;
        debug!(
            owner_id = %owner_id,
            api_name = %snapshot.api_name,
            remaining = snapshot.remaining,
            limit = snapshot.limit,
            "Rate limit snapshot upserted"
        );
        Ok(snapshot)
    }

    async fn get(&self, owner_id: &str, api_name: &str) -> StoreResult<Option<RateLimitSnapshot>> {
        Ok(rate_limit::get_rate_limit(&self.pool, owner_id, api_name.trim(), &Utc::now()).await?)
    }

    async fn list(&self, owner_id: &str) -> StoreResult<Vec<RateLimitSnapshot>> {
        Ok(rate_limit::list_rate_limits(&self.pool, owner_id, &Utc::now()).await?)
    }

    async fn delete(&self, owner_id: &str, api_name: &str) -> StoreResult<bool> {
        let rows = rate_limit::delete_rate_limit(&self.pool, owner_id, api_name.trim()).await?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header_name() {
        assert_eq!(normalize_header_name(None).unwrap(), None);
        assert_eq!(normalize_header_name(Some("  ")).unwrap(), None);
        assert_eq!(
            normalize_header_name(Some("X-API-Key")).unwrap().as_deref(),
            Some("X-API-Key")
        );
        assert!(matches!(
            normalize_header_name(Some("bad header")),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_api_name_trims() {
        assert_eq!(validate_api_name("  GitHub ").unwrap(), "GitHub");
        assert!(validate_api_name("   ").is_err());
    }
}
