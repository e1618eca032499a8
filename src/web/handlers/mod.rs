use axum::{Json, extract::rejection::JsonRejection};

use crate::error::{AppError, AppResult};

pub mod api_key_handler;
pub mod dashboard_handler;
pub mod health_handler;
pub mod proxy_handler;
pub mod rate_limit_handler;
pub mod request_log_handler;

/// Unwrap a JSON body, turning axum's rejection into an `invalid_request` error
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}
