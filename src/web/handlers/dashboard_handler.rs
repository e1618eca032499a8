use axum::{Json, extract::State};

use crate::dashboard::DashboardStats;
use crate::error::AppResult;
use crate::web::{AppState, OwnerId};

pub async fn get_dashboard_stats(State(state): State<AppState>, owner: OwnerId) -> AppResult<Json<DashboardStats>> {
    let stats = state.dashboard.compute_stats(owner.as_str()).await?;
    Ok(Json(stats))
}
