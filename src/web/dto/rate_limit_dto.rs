use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CreateRateLimitRequest {
    pub api_name: String,
    pub limit: i64,
    pub remaining: i64,
    #[serde(default)]
    pub reset_time: Option<DateTime<Utc>>,
}

/// Omitted fields keep their current value
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRateLimitRequest {
    pub limit: Option<i64>,
    pub remaining: Option<i64>,
    pub reset_time: Option<DateTime<Utc>>,
}
