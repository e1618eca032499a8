use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Result, SqlitePool};

use crate::dao::db_timestamp;

/// One proxied call. Rows are only ever inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RequestLogEntry {
    pub id: String,
    pub owner_id: String,
    pub method: String,
    pub url: String,
    pub status_code: i64,
    pub time_taken_ms: f64,
    pub timestamp: DateTime<Utc>,
    /// Set when the call never produced an upstream response
    pub error_message: Option<String>,
}

/// Aggregates over an owner's log window
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct RequestLogSummary {
    pub total_calls: i64,
    pub successful_calls: i64,
    pub avg_latency_ms: Option<f64>,
}

/// Append a log entry (async)
pub async fn create_request_log(pool: &SqlitePool, entry: &RequestLogEntry) -> Result<u64> {
    let res = sqlx::query(
        r#"
        INSERT INTO request_logs (
            id, owner_id, method, url, status_code, time_taken_ms, error_message, timestamp
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(&entry.id)
    .bind(&entry.owner_id)
    .bind(&entry.method)
    .bind(&entry.url)
    .bind(entry.status_code)
    .bind(entry.time_taken_ms)
    .bind(&entry.error_message)
    .bind(db_timestamp(&entry.timestamp))
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// List an owner's log entries newest first, with pagination (async)
pub async fn list_request_logs_paginated(
    pool: &SqlitePool,
    owner_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<RequestLogEntry>> {
    let entries = sqlx::query_as::<_, RequestLogEntry>(
        r#"
        SELECT * FROM request_logs
        WHERE owner_id = ?
        ORDER BY timestamp DESC, rowid DESC
        LIMIT ? OFFSET ?
    "#,
    )
    .bind(owner_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Call count, success count (status < 400) and mean latency since `since` (async)
pub async fn get_request_log_summary(
    pool: &SqlitePool,
    owner_id: &str,
    since: &DateTime<Utc>,
) -> Result<RequestLogSummary> {
    let summary = sqlx::query_as::<_, RequestLogSummary>(
        r#"
        SELECT
            COUNT(*) AS total_calls,
            COALESCE(SUM(CASE WHEN status_code < 400 THEN 1 ELSE 0 END), 0) AS successful_calls,
            AVG(time_taken_ms) AS avg_latency_ms
        FROM request_logs
        WHERE owner_id = ? AND timestamp >= ?
    "#,
    )
    .bind(owner_id)
    .bind(db_timestamp(since))
    .fetch_one(pool)
    .await?;
    Ok(summary)
}
