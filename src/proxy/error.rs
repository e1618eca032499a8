use std::time::Duration;

use thiserror::Error;

use crate::stores::StoreError;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Malformed url, method, header or body, or a blocked destination
    #[error("{0}")]
    InvalidRequest(String),

    #[error("api key {0} not found")]
    KeyNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("upstream response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Status recorded in the request log for attempts that produced no upstream response
    pub fn log_status(&self) -> Option<u16> {
        match self {
            ProxyError::Network(_) | ProxyError::ResponseTooLarge { .. } => Some(502),
            ProxyError::Timeout(_) => Some(504),
            _ => None,
        }
    }
}

impl From<StoreError> for ProxyError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { id, .. } => ProxyError::KeyNotFound(id),
            StoreError::Invalid(message) => ProxyError::InvalidRequest(message),
            other => ProxyError::Internal(other.to_string()),
        }
    }
}
