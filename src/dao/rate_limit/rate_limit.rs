use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Result, SqlitePool};

use crate::dao::db_timestamp;

/// Lifetime of a snapshot whose reset time is unknown or already passed
pub const SNAPSHOT_TTL_SECS: i64 = 3600;

/// Latest observed rate-limit state for one (owner, api_name).
///
/// `api_name` compares case-insensitively (the column is `COLLATE NOCASE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RateLimitSnapshot {
    pub owner_id: String,
    pub api_name: String,
    pub remaining: i64,
    #[sqlx(rename = "request_limit")]
    pub limit: i64,
    pub reset_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl RateLimitSnapshot {
    /// `round(remaining / limit * 100)` with ties to even, undefined for a non-positive limit
    pub fn percentage(&self) -> Option<i64> {
        if self.limit <= 0 {
            return None;
        }
        Some(((self.remaining as f64 / self.limit as f64) * 100.0).round_ties_even() as i64)
    }

    /// The reset time when it lies after the observation, otherwise one hour after it
    pub fn expires_at(&self) -> DateTime<Utc> {
        match self.reset_time {
            Some(reset) if reset > self.last_updated => reset,
            _ => self
                .last_updated
                .checked_add_signed(Duration::seconds(SNAPSHOT_TTL_SECS))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Insert or overwrite a snapshot, last write wins (async)
pub async fn upsert_rate_limit(pool: &SqlitePool, snapshot: &RateLimitSnapshot) -> Result<u64> {
    let res = sqlx::query(
        r#"
        INSERT INTO rate_limits (
            owner_id, api_name, remaining, request_limit, reset_time, last_updated, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (owner_id, api_name) DO UPDATE SET
            api_name = excluded.api_name,
            remaining = excluded.remaining,
            request_limit = excluded.request_limit,
            reset_time = excluded.reset_time,
            last_updated = excluded.last_updated,
            expires_at = excluded.expires_at
    "#,
    )
    .bind(&snapshot.owner_id)
    .bind(&snapshot.api_name)
    .bind(snapshot.remaining)
    .bind(snapshot.limit)
    .bind(snapshot.reset_time.as_ref().map(db_timestamp))
    .bind(db_timestamp(&snapshot.last_updated))
    .bind(db_timestamp(&snapshot.expires_at()))
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Read one snapshot still live at `now` (async)
pub async fn get_rate_limit(
    pool: &SqlitePool,
    owner_id: &str,
    api_name: &str,
    now: &DateTime<Utc>,
) -> Result<Option<RateLimitSnapshot>> {
    let snapshot = sqlx::query_as::<_, RateLimitSnapshot>(
        "SELECT * FROM rate_limits WHERE owner_id = ? AND api_name = ? AND expires_at > ?",
    )
    .bind(owner_id)
    .bind(api_name)
    .bind(db_timestamp(now))
    .fetch_optional(pool)
    .await?;
    Ok(snapshot)
}

/// List an owner's live snapshots ordered by api name (async)
pub async fn list_rate_limits(pool: &SqlitePool, owner_id: &str, now: &DateTime<Utc>) -> Result<Vec<RateLimitSnapshot>> {
    let snapshots = sqlx::query_as::<_, RateLimitSnapshot>(
        "SELECT * FROM rate_limits WHERE owner_id = ? AND expires_at > ? ORDER BY api_name",
    )
    .bind(owner_id)
    .bind(db_timestamp(now))
    .fetch_all(pool)
    .await?;
    Ok(snapshots)
}

/// Delete one snapshot (async)
pub async fn delete_rate_limit(pool: &SqlitePool, owner_id: &str, api_name: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM rate_limits WHERE owner_id = ? AND api_name = ?")
        .bind(owner_id)
        .bind(api_name)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Drop every snapshot expired at `now` (async)
pub async fn delete_expired_rate_limits(pool: &SqlitePool, now: &DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query("DELETE FROM rate_limits WHERE expires_at <= ?")
        .bind(db_timestamp(now))
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
