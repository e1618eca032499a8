use axum::{
    Json,
    extract::{Query, State},
};

use crate::dao::request_log::RequestLogEntry;
use crate::error::{AppError, AppResult};
use crate::web::dto::request_log_dto::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, RequestLogQuery};
use crate::web::{AppState, OwnerId};

/// Newest-first request history
pub async fn list_request_logs(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<RequestLogQuery>,
) -> AppResult<Json<Vec<RequestLogEntry>>> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0);
    if limit < 0 || offset < 0 {
        return Err(AppError::InvalidRequest(
            "limit and offset must be non-negative".to_string(),
        ));
    }

    let entries = state
        .logs
        .list(owner.as_str(), limit.min(MAX_PAGE_SIZE), offset)
        .await?;
    Ok(Json(entries))
}
