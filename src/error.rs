use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::proxy::ProxyError;
use crate::stores::StoreError;

/// Errors surfaced by the HTTP API
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("missing owner identity")]
    Unauthenticated,

    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    #[error("api key {0} not found")]
    KeyNotFound(String),

    #[error("{0}")]
    Network(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    ResponseTooLarge(String),

    /// Logged in full, never echoed to the client
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Unauthenticated => "unauthenticated",
            AppError::NotFound { .. } => "not_found",
            AppError::KeyNotFound(_) => "key_not_found",
            AppError::Network(_) => "network_error",
            AppError::Timeout(_) => "timeout",
            AppError::ResponseTooLarge(_) => "response_too_large",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::NotFound { .. } | AppError::KeyNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Network(_) | AppError::ResponseTooLarge(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the caller
    pub fn user_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(_) => tracing::error!("Internal service error: {}", self),
            AppError::Network(_) | AppError::Timeout(_) | AppError::ResponseTooLarge(_) => {
                tracing::warn!(kind = self.kind(), "Upstream error: {}", self)
            }
            AppError::Unauthenticated => tracing::info!("Authentication error: {}", self),
            _ => tracing::debug!(kind = self.kind(), "Client error: {}", self),
        }

        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.user_message(),
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<ProxyError> for AppError {
    fn from(error: ProxyError) -> Self {
        match error {
            ProxyError::InvalidRequest(message) => AppError::InvalidRequest(message),
            ProxyError::KeyNotFound(id) => AppError::KeyNotFound(id),
            err @ ProxyError::Network(_) => AppError::Network(err.to_string()),
            err @ ProxyError::Timeout(_) => AppError::Timeout(err.to_string()),
            err @ ProxyError::ResponseTooLarge { .. } => AppError::ResponseTooLarge(err.to_string()),
            ProxyError::Internal(message) => AppError::Internal(message),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { resource, id } => AppError::NotFound {
                resource: resource.to_string(),
                id,
            },
            StoreError::Invalid(message) => AppError::InvalidRequest(message),
            other => AppError::Internal(other.to_string()),
        }
    }
}
