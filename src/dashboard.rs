//! Read-only dashboard statistics, recomputed on every call.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::dao::rate_limit::RateLimitSnapshot;
use crate::stores::{CredentialStore, RateLimitStore, RequestLogStore, StoreResult};

/// One rate-limit snapshot as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitView {
    pub api_name: String,
    pub limit: i64,
    pub remaining: i64,
    pub reset_time: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub percentage: Option<i64>,
}

impl From<RateLimitSnapshot> for RateLimitView {
    fn from(snapshot: RateLimitSnapshot) -> Self {
        Self {
            percentage: snapshot.percentage(),
            api_name: snapshot.api_name,
            limit: snapshot.limit,
            remaining: snapshot.remaining,
            reset_time: snapshot.reset_time,
            last_updated: snapshot.last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_api_keys: i64,
    /// Calls inside the trailing window
    pub api_calls: i64,
    /// Percentage of calls with status < 400; `None` without calls
    pub success_rate: Option<f64>,
    /// Mean latency in ms; `None` without calls
    pub average_latency: Option<f64>,
    pub rate_limits: BTreeMap<String, RateLimitView>,
}

/// Longest accepted statistics window, in days
pub const MAX_STATS_WINDOW_DAYS: i64 = 36_500;

#[derive(Clone)]
pub struct DashboardAggregator {
    credentials: Arc<dyn CredentialStore>,
    logs: Arc<dyn RequestLogStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    window: Duration,
}

impl DashboardAggregator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        logs: Arc<dyn RequestLogStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        window_days: i64,
    ) -> Self {
        Self {
            credentials,
            logs,
            rate_limits,
            window: Duration::days(window_days.clamp(1, MAX_STATS_WINDOW_DAYS)),
        }
    }

    pub async fn compute_stats(&self, owner_id: &str) -> StoreResult<DashboardStats> {
        self.compute_stats_at(owner_id, Utc::now()).await
    }

    /// Statistics as of `now`
    pub async fn compute_stats_at(&self, owner_id: &str, now: DateTime<Utc>) -> StoreResult<DashboardStats> {
        let since = now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (total_api_keys, summary, snapshots) = tokio::try_join!(
            self.credentials.count(owner_id),
            self.logs.summarize(owner_id, since),
            self.rate_limits.list(owner_id),
        )?;

        let api_calls = summary.total_calls;
        let (success_rate, average_latency) = if api_calls > 0 {
            (
                Some(summary.successful_calls as f64 * 100.0 / api_calls as f64),
                summary.avg_latency_ms,
            )
        } else {
            (None, None)
        };

        let rate_limits = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.api_name.clone(), RateLimitView::from(snapshot)))
            .collect();

        Ok(DashboardStats {
            total_api_keys,
            api_calls,
            success_rate,
            average_latency,
            rate_limits,
        })
    }
}
