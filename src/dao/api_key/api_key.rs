use chrono::{DateTime, Utc};
use sqlx::{Result, SqlitePool};

use crate::dao::db_timestamp;

/// Stored API key. The secret only ever exists here as ciphertext.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ApiKeyRecord {
    pub id: String,
    pub owner_id: String,
    pub api_name: String,
    pub key_hash: String,
    pub encrypted_key_value: String,
    pub key_preview: String,
    /// Injection header; `None` means `Authorization: Bearer <secret>`
    pub header_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert a new api key row (async)
pub async fn create_api_key(pool: &SqlitePool, record: &ApiKeyRecord) -> Result<u64> {
    let res = sqlx::query(
        r#"
        INSERT INTO api_keys (
            id, owner_id, api_name, key_hash, encrypted_key_value, key_preview,
            header_name, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(&record.id)
    .bind(&record.owner_id)
    .bind(&record.api_name)
    .bind(&record.key_hash)
    .bind(&record.encrypted_key_value)
    .bind(&record.key_preview)
    .bind(&record.header_name)
    .bind(db_timestamp(&record.created_at))
    .bind(db_timestamp(&record.updated_at))
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Read one key, scoped to its owner (async)
pub async fn get_api_key(pool: &SqlitePool, owner_id: &str, id: &str) -> Result<Option<ApiKeyRecord>> {
    let record = sqlx::query_as::<_, ApiKeyRecord>("SELECT * FROM api_keys WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// List an owner's keys, newest first (async)
pub async fn list_api_keys(pool: &SqlitePool, owner_id: &str) -> Result<Vec<ApiKeyRecord>> {
    let records = sqlx::query_as::<_, ApiKeyRecord>(
        "SELECT * FROM api_keys WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

/// Count an owner's keys (async)
pub async fn count_api_keys(pool: &SqlitePool, owner_id: &str) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE owner_id = ?")
        .bind(owner_id)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

/// Overwrite the mutable columns of a key (async)
pub async fn update_api_key(pool: &SqlitePool, record: &ApiKeyRecord) -> Result<u64> {
    let res = sqlx::query(
        r#"
        UPDATE api_keys SET
            api_name = ?,
            key_hash = ?,
            encrypted_key_value = ?,
            key_preview = ?,
            header_name = ?,
            updated_at = ?
        WHERE id = ? AND owner_id = ?
    "#,
    )
    .bind(&record.api_name)
    .bind(&record.key_hash)
    .bind(&record.encrypted_key_value)
    .bind(&record.key_preview)
    .bind(&record.header_name)
    .bind(db_timestamp(&record.updated_at))
    .bind(&record.id)
    .bind(&record.owner_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Delete a key, scoped to its owner (async)
pub async fn delete_api_key(pool: &SqlitePool, owner_id: &str, id: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM api_keys WHERE id = ? AND owner_id = ?")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
