use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;

use super::json_body;
use crate::dashboard::RateLimitView;
use crate::error::{AppError, AppResult};
use crate::stores::RateLimitFragment;
use crate::web::dto::rate_limit_dto::{CreateRateLimitRequest, UpdateRateLimitRequest};
use crate::web::{AppState, OwnerId};

fn rate_limit_not_found(api_name: &str) -> AppError {
    AppError::NotFound {
        resource: "rate limit".to_string(),
        id: api_name.to_string(),
    }
}

fn validate_counts(limit: i64, remaining: i64) -> AppResult<()> {
    if limit < 0 || remaining < 0 {
        return Err(AppError::InvalidRequest(
            "limit and remaining must be non-negative".to_string(),
        ));
    }
    Ok(())
}

pub async fn list_rate_limits(State(state): State<AppState>, owner: OwnerId) -> AppResult<Json<Vec<RateLimitView>>> {
    let snapshots = state.rate_limits.list(owner.as_str()).await?;
    Ok(Json(snapshots.into_iter().map(RateLimitView::from).collect()))
}

pub async fn get_rate_limit(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(api_name): Path<String>,
) -> AppResult<Json<RateLimitView>> {
    let snapshot = state
        .rate_limits
        .get(owner.as_str(), &api_name)
        .await?
        .ok_or_else(|| rate_limit_not_found(&api_name))?;
    Ok(Json(snapshot.into()))
}

/// Manually record a rate-limit observation
pub async fn create_rate_limit(
    State(state): State<AppState>,
    owner: OwnerId,
    payload: Result<Json<CreateRateLimitRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RateLimitView>)> {
    let request = json_body(payload)?;
    validate_counts(request.limit, request.remaining)?;

    let fragment = RateLimitFragment {
        remaining: request.remaining,
        limit: request.limit,
        reset_time: request.reset_time,
        observed_at: Utc::now(),
    };
    let snapshot = state
        .rate_limits
        .upsert(owner.as_str(), &request.api_name, &fragment)
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot.into())))
}

/// Patch an existing snapshot; omitted fields are kept
pub async fn update_rate_limit(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(api_name): Path<String>,
    payload: Result<Json<UpdateRateLimitRequest>, JsonRejection>,
) -> AppResult<Json<RateLimitView>> {
    let request = json_body(payload)?;
    let existing = state
        .rate_limits
        .get(owner.as_str(), &api_name)
        .await?
        .ok_or_else(|| rate_limit_not_found(&api_name))?;

    let fragment = RateLimitFragment {
        remaining: request.remaining.unwrap_or(existing.remaining),
        limit: request.limit.unwrap_or(existing.limit),
        reset_time: request.reset_time.or(existing.reset_time),
        observed_at: Utc::now(),
    };
    validate_counts(fragment.limit, fragment.remaining)?;

    let snapshot = state
        .rate_limits
        .upsert(owner.as_str(), &existing.api_name, &fragment)
        .await?;
    Ok(Json(snapshot.into()))
}

pub async fn delete_rate_limit(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(api_name): Path<String>,
) -> AppResult<StatusCode> {
    if !state.rate_limits.delete(owner.as_str(), &api_name).await? {
        return Err(rate_limit_not_found(&api_name));
    }
    Ok(StatusCode::NO_CONTENT)
}
