use axum::{Json, extract::State};

use crate::web::AppState;
use crate::web::dto::health_dto::HealthResponse;

/// Liveness plus proxy counters; no owner required
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now(),
        proxy: state.executor.client().metrics().into(),
    })
}
