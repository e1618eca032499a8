//! Outbound HTTP client used by the proxy.
//!
//! Wraps one pooled `reqwest::Client` with:
//! - a hard timeout around the whole exchange, body included
//! - an optional cap on the response body size
//! - in-process latency metrics
//! - structured request logging

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use reqwest::dns::{Name, Resolve, Resolving};
use reqwest::header::HeaderMap;
use reqwest::{Client as HttpClient, Response};
use tokio::time::timeout;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use super::error::ProxyError;
use super::model::{HttpMethod, ProxyResult, ResponseBody};
use super::validate::{DestinationBlocked, PublicOnlyResolver, SystemResolver};
use crate::config::ProxyConfig;

/// Per-call bookkeeping for logs and timing
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: HttpMethod,
    pub url: String,
    pub start_time: Instant,
}

impl RequestContext {
    pub fn new(method: HttpMethod, url: &Url) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            url: url.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

/// Proxy-wide counters. A call that got any upstream response counts as successful.
#[derive(Debug, Clone, Default)]
pub struct ProxyMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time: Duration,
    pub max_response_time: Duration,
    pub min_response_time: Duration,
}

/// Outbound request, already validated and with credentials applied
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct ProxyClient {
    client: HttpClient,
    config: ProxyConfig,
    metrics: Arc<Mutex<ProxyMetrics>>,
}

impl ProxyClient {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Resolve host names through `resolver`. With `block_private_networks` on,
    /// its answers are filtered down to public addresses.
    pub fn with_resolver(config: ProxyConfig, resolver: Arc<dyn Resolve>) -> Result<Self, ProxyError> {
        let mut builder = HttpClient::builder()
            .no_proxy()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            // 3xx responses go back to the caller untouched
            .redirect(reqwest::redirect::Policy::none());
        builder = if config.block_private_networks {
            builder.dns_resolver(Arc::new(PublicOnlyResolver::new(resolver)))
        } else {
            builder.dns_resolver(Arc::new(SharedResolver(resolver)))
        };
        let client = builder
            .build()
            .map_err(|e| ProxyError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Self::new_with_client(config, Some(client))
    }

    /// Build with an injected HTTP client (tests)
    pub fn new_with_client(config: ProxyConfig, custom_client: Option<HttpClient>) -> Result<Self, ProxyError> {
        let client = match custom_client {
            Some(client) => client,
            None => return Self::new(config),
        };

        Ok(Self {
            client,
            config,
            metrics: Arc::new(Mutex::new(ProxyMetrics::default())),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn metrics(&self) -> ProxyMetrics {
        match self.metrics.lock() {
            Ok(metrics) => metrics.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Single attempt, no retries. Any upstream status is a successful result.
    pub async fn send(&self, ctx: &RequestContext, request: OutboundRequest) -> Result<ProxyResult, ProxyError> {
        self.log_request_start(ctx);

        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let exchange = async {
            let response = builder.send().await.map_err(|e| self.map_reqwest_error(ctx, e))?;
            let status_code = response.status().as_u16();
            let headers = collect_headers(response.headers());
            let body = self.read_body(ctx, response).await?;
            Ok::<_, ProxyError>((status_code, headers, body))
        };

        match timeout(self.config.request_timeout, exchange).await {
            Ok(Ok((status_code, headers, body))) => {
                let elapsed = ctx.elapsed();
                self.log_request_success(ctx, status_code, body.len());
                self.update_success_metrics(elapsed);
                Ok(ProxyResult {
                    status_code,
                    headers,
                    body: ResponseBody::from_bytes(&body),
                    time_taken_ms: elapsed.as_secs_f64() * 1000.0,
                })
            }
            Ok(Err(err)) => {
                self.log_request_failure(ctx, &err);
                self.update_failure_metrics();
                Err(err)
            }
            Err(_) => {
                self.log_timeout_error(ctx);
                self.update_failure_metrics();
                Err(ProxyError::Timeout(self.config.request_timeout))
            }
        }
    }

    async fn read_body(&self, ctx: &RequestContext, response: Response) -> Result<Vec<u8>, ProxyError> {
        let Some(limit) = self.config.max_response_bytes else {
            let bytes = response.bytes().await.map_err(|e| self.map_reqwest_error(ctx, e))?;
            return Ok(bytes.to_vec());
        };

        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::ResponseTooLarge { limit });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_reqwest_error(ctx, e))?;
            if body.len() + chunk.len() > limit {
                return Err(ProxyError::ResponseTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn map_reqwest_error(&self, ctx: &RequestContext, error: reqwest::Error) -> ProxyError {
        if let Some(blocked) = find_blocked_destination(&error) {
            return ProxyError::InvalidRequest(blocked.to_string());
        }
        if error.is_timeout() {
            return ProxyError::Timeout(self.config.request_timeout);
        }
        self.log_network_error(ctx, &error);
        if error.is_builder() {
            return ProxyError::InvalidRequest(error.to_string());
        }
        ProxyError::Network(error.to_string())
    }

    fn update_success_metrics(&self, response_time: Duration) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.total_requests += 1;
            metrics.successful_requests += 1;

            if metrics.successful_requests == 1 {
                metrics.min_response_time = response_time;
                metrics.max_response_time = response_time;
                metrics.avg_response_time = response_time;
            } else {
                if response_time < metrics.min_response_time {
                    metrics.min_response_time = response_time;
                }
                if response_time > metrics.max_response_time {
                    metrics.max_response_time = response_time;
                }
                let n = metrics.successful_requests as u32;
                let total_time = metrics.avg_response_time * (n - 1) + response_time;
                metrics.avg_response_time = total_time / n;
            }
        }
    }

    fn update_failure_metrics(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.total_requests += 1;
            metrics.failed_requests += 1;
        }
    }

    fn log_request_start(&self, ctx: &RequestContext) {
        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            url = %ctx.url,
            "Starting proxied request"
        );
    }

    fn log_request_success(&self, ctx: &RequestContext, status_code: u16, body_len: usize) {
        info!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            url = %ctx.url,
            status_code = status_code,
            body_bytes = body_len,
            total_elapsed_ms = ctx.elapsed().as_millis(),
            "Proxied request completed"
        );
    }

    fn log_request_failure(&self, ctx: &RequestContext, error: &ProxyError) {
        error!(
            request_id = %ctx.request_id,
            method = %ctx.method,
            url = %ctx.url,
            total_elapsed_ms = ctx.elapsed().as_millis(),
            error = %error,
            "Proxied request failed"
        );
    }

    fn log_network_error(&self, ctx: &RequestContext, error: &reqwest::Error) {
        let error_details = format!(
            "is_timeout: {}, is_connect: {}, is_request: {}, is_body: {}",
            error.is_timeout(),
            error.is_connect(),
            error.is_request(),
            error.is_body(),
        );

        warn!(
            request_id = %ctx.request_id,
            url = %ctx.url,
            error_type = "network_error",
            error_details = %error_details,
            error_message = %error,
            "Network error occurred"
        );
    }

    fn log_timeout_error(&self, ctx: &RequestContext) {
        error!(
            request_id = %ctx.request_id,
            url = %ctx.url,
            timeout_duration_ms = self.config.request_timeout.as_millis(),
            actual_elapsed_ms = ctx.elapsed().as_millis(),
            error_type = "timeout_error",
            "Proxied request timed out"
        );
    }
}

/// `Arc<dyn Resolve>` handed to reqwest unchanged
struct SharedResolver(Arc<dyn Resolve>);

impl Resolve for SharedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        self.0.resolve(name)
    }
}

/// The resolver's rejection, if that is what failed the request
fn find_blocked_destination(error: &reqwest::Error) -> Option<&DestinationBlocked> {
    let mut source = std::error::Error::source(error);
    while let Some(err) = source {
        if let Some(blocked) = err.downcast_ref::<DestinationBlocked>() {
            return Some(blocked);
        }
        source = err.source();
    }
    None
}

/// Lower-cased header map; repeated headers are joined with ", "
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        collected
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}
