use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub mod api_key;
pub mod cache;
pub mod rate_limit;
pub mod request_log;

/// Schema applied by `init_db`
const INIT_SQL: &str = include_str!("../../data/init.sql");

/// Open a SQLite pool, creating the database file if needed.
///
/// In-memory databases get a single long-lived connection so every query sees
/// the same database.
pub async fn init_sqlite_pool(db_url: &str) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

    if db_url.contains(":memory:") || db_url.contains("mode=memory") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new().connect_with(options).await
    }
}

/// Execute the bundled schema script, one statement at a time
pub async fn init_db(pool: &SqlitePool) -> sqlx::Result<()> {
    for statement in INIT_SQL.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt).execute(pool).await?;
        }
    }
    Ok(())
}

/// Fixed-width UTC text form, so timestamp columns sort chronologically.
pub(crate) fn db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_db_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(5);
        assert_eq!(db_timestamp(&whole), "2024-05-01T12:00:00.000Z");
        assert_eq!(db_timestamp(&fractional), "2024-05-01T12:00:00.005Z");
        assert!(db_timestamp(&whole) < db_timestamp(&fractional));
    }

    #[tokio::test]
    async fn test_init_db_is_idempotent() {
        let pool = init_sqlite_pool("sqlite::memory:").await.unwrap();
        init_db(&pool).await.unwrap();
        init_db(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["api_keys", "rate_limits", "request_logs"]);
    }
}
