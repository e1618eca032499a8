use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::{info, warn};

use super::json_body;
use crate::dao::api_key::ApiKeyRecord;
use crate::error::AppResult;
use crate::stores::{ApiKeyPatch, NewApiKey};
use crate::web::dto::api_key_dto::{ApiKeyResponse, CreateApiKeyRequest, UpdateApiKeyRequest};
use crate::web::{AppState, OwnerId};

async fn to_response(state: &AppState, owner: &OwnerId, record: ApiKeyRecord) -> AppResult<ApiKeyResponse> {
    if !state.expose_secrets {
        return Ok(ApiKeyResponse::masked(record));
    }
    let revealed = state.credentials.reveal_secret(owner.as_str(), &record.id).await?;
    Ok(ApiKeyResponse::with_secret(revealed.record, revealed.secret))
}

/// List the caller's API keys
pub async fn list_api_keys(State(state): State<AppState>, owner: OwnerId) -> AppResult<Json<Vec<ApiKeyResponse>>> {
    let records = state.credentials.list(owner.as_str()).await?;
    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        keys.push(to_response(&state, &owner, record).await?);
    }
    Ok(Json(keys))
}

pub async fn get_api_key(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(key_id): Path<String>,
) -> AppResult<Json<ApiKeyResponse>> {
    let record = state.credentials.get(owner.as_str(), &key_id).await?;
    Ok(Json(to_response(&state, &owner, record).await?))
}

/// Store a new key
pub async fn create_api_key(
    State(state): State<AppState>,
    owner: OwnerId,
    payload: Result<Json<CreateApiKeyRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiKeyResponse>)> {
    let request = json_body(payload)?;
    let record = state
        .credentials
        .create(
            owner.as_str(),
            NewApiKey {
                api_name: request.api_name,
                secret: request.api_key,
                header_name: request.header_name,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(to_response(&state, &owner, record).await?)))
}

pub async fn update_api_key(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(key_id): Path<String>,
    payload: Result<Json<UpdateApiKeyRequest>, JsonRejection>,
) -> AppResult<Json<ApiKeyResponse>> {
    let request = json_body(payload)?;
    let record = state
        .credentials
        .update(
            owner.as_str(),
            &key_id,
            ApiKeyPatch {
                api_name: request.api_name,
                secret: request.api_key,
                header_name: request.header_name,
            },
        )
        .await?;
    Ok(Json(to_response(&state, &owner, record).await?))
}

/// Delete a key together with the rate-limit snapshot of its api name
pub async fn delete_api_key(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(key_id): Path<String>,
) -> AppResult<StatusCode> {
    let record = state.credentials.delete(owner.as_str(), &key_id).await?;

    match state.rate_limits.delete(owner.as_str(), &record.api_name).await {
        Ok(true) => info!(owner_id = %owner.as_str(), api_name = %record.api_name, "Deleted rate limit snapshot with its key"),
        Ok(false) => {}
        Err(e) => warn!(
            owner_id = %owner.as_str(),
            api_name = %record.api_name,
            error = %e,
            "Failed to delete rate limit snapshot for removed key"
        ),
    }

    Ok(StatusCode::NO_CONTENT)
}
