use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dao::api_key::ApiKeyRecord;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: String,
    pub api_name: String,
    /// Masked preview such as "ghp_...wxyz", or the plaintext when secrets are exposed
    pub api_key: String,
    pub header_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKeyResponse {
    pub fn masked(record: ApiKeyRecord) -> Self {
        let api_key = record.key_preview.clone();
        Self::with_secret(record, api_key)
    }

    pub fn with_secret(record: ApiKeyRecord, api_key: String) -> Self {
        Self {
            id: record.id,
            api_name: record.api_name,
            api_key,
            header_name: record.header_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub api_name: String,
    pub api_key: String,
    #[serde(default)]
    pub header_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateApiKeyRequest {
    pub api_name: Option<String>,
    pub api_key: Option<String>,
    /// Empty string resets to `Authorization: Bearer`
    pub header_name: Option<String>,
}
