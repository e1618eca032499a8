use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{
    AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderMap, HeaderName, HeaderValue,
    TRANSFER_ENCODING,
};
use tracing::{debug, error, info};
use url::Url;

use super::client::{OutboundRequest, ProxyClient, RequestContext};
use super::error::ProxyError;
use super::extractor::extract_rate_limit;
use super::model::{HttpMethod, ProxyRequest, ProxyResult};
use super::validate::{ensure_public_host, parse_target_url};
use crate::dao::request_log::RequestLogEntry;
use crate::stores::{CredentialStore, RateLimitStore, RequestLogStore, RevealedKey};

/// Set by the client library from the body and target; never forwarded from the caller
const CALLER_MANAGED_HEADERS: [HeaderName; 4] = [HOST, CONTENT_LENGTH, CONNECTION, TRANSFER_ENCODING];

/// Runs proxied calls and records their side effects.
#[derive(Clone)]
pub struct ProxyExecutor {
    client: ProxyClient,
    credentials: Arc<dyn CredentialStore>,
    logs: Arc<dyn RequestLogStore>,
    rate_limits: Arc<dyn RateLimitStore>,
}

impl ProxyExecutor {
    pub fn new(
        client: ProxyClient,
        credentials: Arc<dyn CredentialStore>,
        logs: Arc<dyn RequestLogStore>,
        rate_limits: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            client,
            credentials,
            logs,
            rate_limits,
        }
    }

    pub fn client(&self) -> &ProxyClient {
        &self.client
    }

    /// Validate, inject credentials, send, then log and record rate limits.
    ///
    /// Requests rejected before the outbound call leave no trace in the request
    /// log. Once the call is attempted a log entry is always written, with 502 or
    /// 504 standing in for the status when no upstream response arrived.
    pub async fn execute(&self, owner_id: &str, request: ProxyRequest) -> Result<ProxyResult, ProxyError> {
        let method: HttpMethod = request.method.parse()?;
        let url = parse_target_url(&request.url)?;
        if self.client.config().block_private_networks {
            ensure_public_host(&url)?;
        }

        let credential = match request.api_key_id.as_deref() {
            Some(key_id) => Some(self.credentials.reveal_secret(owner_id, key_id).await?),
            None => None,
        };

        let mut headers = build_caller_headers(&request)?;
        if let Some(key) = credential.as_ref() {
            let (name, value) = credential_header(key)?;
            headers.insert(name, value);
        }
        let body = encode_body(method, request.body, &mut headers)?;

        let ctx = RequestContext::new(method, &url);
        debug!(
            request_id = %ctx.request_id,
            owner_id = %owner_id,
            api_key_id = request.api_key_id.as_deref().unwrap_or("none"),
            "Dispatching proxy request"
        );

        let outcome = self
            .client
            .send(
                &ctx,
                OutboundRequest {
                    method,
                    url: url.clone(),
                    headers,
                    body,
                },
            )
            .await;

        match &outcome {
            Ok(result) => {
                self.record_log(owner_id, &ctx, &url, result.status_code, result.time_taken_ms, None)
                    .await;
                if let Some(key) = credential.as_ref() {
                    self.record_rate_limit(owner_id, &ctx, key, result).await;
                }
            }
            Err(err) => {
                if let Some(status) = err.log_status() {
                    self.record_log(owner_id, &ctx, &url, status, ctx.elapsed_ms(), Some(err.to_string()))
                        .await;
                }
            }
        }

        outcome
    }

    async fn record_log(
        &self,
        owner_id: &str,
        ctx: &RequestContext,
        url: &Url,
        status_code: u16,
        time_taken_ms: f64,
        error_message: Option<String>,
    ) {
        let entry = RequestLogEntry {
            id: ctx.request_id.clone(),
            owner_id: owner_id.to_string(),
            method: ctx.method.to_string(),
            url: url.to_string(),
            status_code: i64::from(status_code),
            time_taken_ms,
            timestamp: Utc::now(),
            error_message,
        };

        if let Err(e) = self.logs.append(&entry).await {
            error!(
                request_id = %ctx.request_id,
                owner_id = %owner_id,
                error = %e,
                "Failed to create request log record"
            );
        }
    }

    async fn record_rate_limit(&self, owner_id: &str, ctx: &RequestContext, key: &RevealedKey, result: &ProxyResult) {
        let Some(fragment) = extract_rate_limit(&result.headers, Utc::now()) else {
            return;
        };

        match self.rate_limits.upsert(owner_id, &key.record.api_name, &fragment).await {
            Ok(snapshot) => info!(
                request_id = %ctx.request_id,
                owner_id = %owner_id,
                api_name = %snapshot.api_name,
                remaining = snapshot.remaining,
                limit = snapshot.limit,
                "Rate limit updated from response headers"
            ),
            Err(e) => error!(
                request_id = %ctx.request_id,
                owner_id = %owner_id,
                api_name = %key.record.api_name,
                error = %e,
                "Failed to update rate limit"
            ),
        }
    }
}

fn build_caller_headers(request: &ProxyRequest) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| ProxyError::InvalidRequest(format!("invalid header name: {:?}", name)))?;
        if CALLER_MANAGED_HEADERS.contains(&header_name) {
            continue;
        }
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ProxyError::InvalidRequest(format!("invalid value for header {}", name)))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// `Authorization: Bearer <secret>` unless the key names its own header
fn credential_header(key: &RevealedKey) -> Result<(HeaderName, HeaderValue), ProxyError> {
    let (name, raw_value) = match key.record.header_name.as_deref() {
        Some(custom) => {
            let name = HeaderName::from_bytes(custom.as_bytes())
                .map_err(|_| ProxyError::Internal(format!("stored header name is invalid: {}", custom)))?;
            (name, key.secret.clone())
        }
        None => (AUTHORIZATION, format!("Bearer {}", key.secret)),
    };

    let mut value = HeaderValue::from_str(&raw_value).map_err(|_| {
        ProxyError::InvalidRequest(format!(
            "api key {} contains characters not allowed in a header",
            key.record.id
        ))
    })?;
    value.set_sensitive(true);
    Ok((name, value))
}

/// Serialize the body for methods that carry one
fn encode_body(
    method: HttpMethod,
    body: Option<serde_json::Value>,
    headers: &mut HeaderMap,
) -> Result<Option<Vec<u8>>, ProxyError> {
    if !method.allows_body() {
        return Ok(None);
    }

    match body {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(text)) => Ok(Some(text.into_bytes())),
        Some(value) => {
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| ProxyError::InvalidRequest(format!("failed to serialize body: {}", e)))?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Ok(Some(bytes))
        }
    }
}
