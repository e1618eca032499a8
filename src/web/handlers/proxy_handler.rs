use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use super::json_body;
use crate::error::AppResult;
use crate::proxy::{ProxyRequest, ProxyResult};
use crate::web::{AppState, OwnerId};

/// Forward a request upstream. Upstream error statuses still come back as 200 with a `ProxyResult`.
pub async fn proxy_request(
    State(state): State<AppState>,
    owner: OwnerId,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> AppResult<Json<ProxyResult>> {
    let request = json_body(payload)?;
    let result = state.executor.execute(owner.as_str(), request).await?;
    Ok(Json(result))
}
