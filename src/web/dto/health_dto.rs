use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::proxy::ProxyMetrics;

#[derive(Debug, Serialize)]
pub struct ProxyMetricsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub min_response_time_ms: f64,
}

impl From<ProxyMetrics> for ProxyMetricsResponse {
    fn from(metrics: ProxyMetrics) -> Self {
        Self {
            total_requests: metrics.total_requests,
            successful_requests: metrics.successful_requests,
            failed_requests: metrics.failed_requests,
            avg_response_time_ms: metrics.avg_response_time.as_secs_f64() * 1000.0,
            max_response_time_ms: metrics.max_response_time.as_secs_f64() * 1000.0,
            min_response_time_ms: metrics.min_response_time.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub proxy: ProxyMetricsResponse,
}
