//! # ProxyExecutor tests
//!
//! Upstream APIs are simulated with mockito:
//! - credential injection and header precedence
//! - validation failures that never reach the network
//! - request logging and rate-limit extraction side effects
//! - timeouts and network failures

mod common;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use api_dashboard::dao::rate_limit::RateLimitSnapshot;
use api_dashboard::dao::request_log::{RequestLogEntry, RequestLogSummary};
use api_dashboard::proxy::{ProxyClient, ProxyError, ProxyExecutor, ProxyRequest, ResponseBody};
use api_dashboard::stores::{
    CredentialStore, NewApiKey, RateLimitFragment, RateLimitStore, RequestLogStore, StoreError, StoreResult,
};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::{OWNER, Stores, executor, test_proxy_config};
use mockito::Matcher;
use serde_json::json;

async fn create_key(stores: &Stores, api_name: &str, secret: &str, header_name: Option<&str>) -> String {
    stores
        .credentials
        .create(
            OWNER,
            NewApiKey {
                api_name: api_name.to_string(),
                secret: secret.to_string(),
                header_name: header_name.map(String::from),
            },
        )
        .await
        .expect("create key")
        .id
}

async fn log_entries(stores: &Stores) -> Vec<RequestLogEntry> {
    stores.logs.list(OWNER, 100, 0).await.expect("list logs")
}

#[tokio::test]
async fn test_no_credential_header_without_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/public")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let stores = Stores::new().await;
    create_key(&stores, "GitHub", "ghp_unused_secret", None).await;
    let executor = executor(&stores, test_proxy_config());

    let result = executor
        .execute(OWNER, ProxyRequest::get(format!("{}/public", server.url())))
        .await
        .expect("proxy call");

    mock.assert_async().await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.body, ResponseBody::Text("ok".to_string()));
}

#[tokio::test]
async fn test_unknown_key_fails_before_any_outbound_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());

    let err = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/user", server.url())).with_api_key("does-not-exist"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::KeyNotFound(id) if id == "does-not-exist"));
    mock.assert_async().await;
    assert!(log_entries(&stores).await.is_empty());
}

#[tokio::test]
async fn test_another_owners_key_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;

    let stores = Stores::new().await;
    let key_id = stores
        .credentials
        .create(
            "someone-else",
            NewApiKey {
                api_name: "GitHub".to_string(),
                secret: "ghp_not_yours".to_string(),
                header_name: None,
            },
        )
        .await
        .unwrap()
        .id;
    let executor = executor(&stores, test_proxy_config());

    let err = executor
        .execute(OWNER, ProxyRequest::get(server.url()).with_api_key(key_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::KeyNotFound(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_github_rate_limit_scenario() {
    println!("=== Testing GitHub rate limit extraction ===");
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/user")
        .match_header("authorization", "Bearer ghp_live_secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("X-RateLimit-Limit", "5000")
        .with_header("X-RateLimit-Remaining", "4999")
        .with_header("X-RateLimit-Reset", "1700000000")
        .with_body(r#"{"login":"octocat"}"#)
        .create_async()
        .await;

    let stores = Stores::new().await;
    let key_id = create_key(&stores, "GitHub", "ghp_live_secret", None).await;
    let executor = executor(&stores, test_proxy_config());

    let result = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/user", server.url())).with_api_key(&key_id),
        )
        .await
        .expect("proxy call");

    mock.assert_async().await;
    assert_eq!(result.status_code, 200);
    assert_eq!(result.body, ResponseBody::Json(json!({"login": "octocat"})));
    assert_eq!(result.headers.get("x-ratelimit-remaining").map(String::as_str), Some("4999"));
    assert!(result.time_taken_ms >= 0.0);

    let snapshot = stores
        .rate_limits
        .get(OWNER, "GitHub")
        .await
        .unwrap()
        .expect("rate limit recorded");
    assert_eq!(snapshot.remaining, 4999);
    assert_eq!(snapshot.limit, 5000);
    assert_eq!(snapshot.percentage(), Some(100));
    let expected_reset: Option<DateTime<Utc>> = Utc.timestamp_opt(1_700_000_000, 0).single();
    assert_eq!(snapshot.reset_time, expected_reset);

    let logs = log_entries(&stores).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 200);
    assert_eq!(logs[0].method, "GET");
    assert!(logs[0].url.ends_with("/user"));
    assert!(logs[0].error_message.is_none());
}

#[tokio::test]
async fn test_rate_limit_headers_ignored_without_key() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(200)
        .with_header("x-ratelimit-limit", "60")
        .with_header("x-ratelimit-remaining", "59")
        .create_async()
        .await;

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());
    executor.execute(OWNER, ProxyRequest::get(server.url())).await.unwrap();

    assert!(stores.rate_limits.list(OWNER).await.unwrap().is_empty());
    assert_eq!(log_entries(&stores).await.len(), 1);
}

#[tokio::test]
async fn test_invalid_url_creates_no_log_and_no_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());

    let err = executor
        .execute(OWNER, ProxyRequest::get("not-a-url"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::InvalidRequest(_)));
    mock.assert_async().await;
    assert!(log_entries(&stores).await.is_empty());
}

#[tokio::test]
async fn test_invalid_method_rejected() {
    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());

    let err = executor
        .execute(OWNER, ProxyRequest::get("https://example.com").with_method("TRACE"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidRequest(_)));
    assert!(log_entries(&stores).await.is_empty());
}

#[tokio::test]
async fn test_lowercase_method_is_normalized() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("DELETE", "/items/1").with_status(204).create_async().await;

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());
    let result = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/items/1", server.url())).with_method("delete"),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.status_code, 204);
    assert_eq!(log_entries(&stores).await[0].method, "DELETE");
}

#[tokio::test]
async fn test_credential_header_overrides_caller_header() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/secure")
        .match_header("authorization", "Bearer stored-secret")
        .match_header("accept", "application/json")
        .with_status(200)
        .create_async()
        .await;

    let stores = Stores::new().await;
    let key_id = create_key(&stores, "Internal", "stored-secret", None).await;
    let executor = executor(&stores, test_proxy_config());

    executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/secure", server.url()))
                .with_header("AUTHORIZATION", "Bearer caller-supplied")
                .with_header("Accept", "application/json")
                .with_api_key(key_id),
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_custom_header_name_injection() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/weather")
        .match_header("x-api-key", "weather-secret")
        .match_header("authorization", Matcher::Missing)
        .with_status(200)
        .create_async()
        .await;

    let stores = Stores::new().await;
    let key_id = create_key(&stores, "Weather", "weather-secret", Some("X-API-Key")).await;
    let executor = executor(&stores, test_proxy_config());

    executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/weather", server.url())).with_api_key(key_id),
        )
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_json_body_gets_content_type() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/items")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({"name": "widget", "count": 2})))
        .with_status(201)
        .with_body(r#"{"id":7}"#)
        .create_async()
        .await;

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());

    let result = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/v1/items", server.url()))
                .with_method("POST")
                .with_body(json!({"name": "widget", "count": 2})),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(result.status_code, 201);
    assert_eq!(result.body, ResponseBody::Json(json!({"id": 7})));
}

#[tokio::test]
async fn test_upstream_error_status_is_a_result() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_header("ratelimit-limit", "100")
        .with_header("ratelimit-remaining", "0")
        .with_header("ratelimit-reset", "30")
        .with_body("slow down")
        .create_async()
        .await;

    let stores = Stores::new().await;
    let key_id = create_key(&stores, "Example", "example-secret", None).await;
    let executor = executor(&stores, test_proxy_config());

    let result = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/limited", server.url())).with_api_key(key_id),
        )
        .await
        .expect("upstream errors are forwarded");

    assert_eq!(result.status_code, 429);
    let snapshot = stores.rate_limits.get(OWNER, "example").await.unwrap().unwrap();
    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.percentage(), Some(0));
    assert!(snapshot.reset_time.is_some());

    let logs = log_entries(&stores).await;
    assert_eq!(logs[0].status_code, 429);
}

#[tokio::test]
async fn test_timeout_is_reported_and_logged() {
    // accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let silent = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let stores = Stores::new().await;
    let executor = executor(
        &stores,
        test_proxy_config().with_request_timeout(Duration::from_millis(200)),
    );

    let err = executor
        .execute(OWNER, ProxyRequest::get(format!("http://{}/slow", addr)))
        .await
        .unwrap_err();
    silent.abort();

    assert!(matches!(err, ProxyError::Timeout(_)));
    let logs = log_entries(&stores).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 504);
    assert!(logs[0].error_message.is_some());
    assert_eq!(executor.client().metrics().failed_requests, 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let stores = Stores::new().await;
    let executor = executor(&stores, test_proxy_config());

    let err = executor
        .execute(OWNER, ProxyRequest::get(format!("http://{}/", addr)))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Network(_)));
    let logs = log_entries(&stores).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 502);
}

#[tokio::test]
async fn test_private_destinations_blocked_by_default() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;

    let stores = Stores::new().await;
    let executor = executor(
        &stores,
        test_proxy_config().with_block_private_networks(true),
    );

    let err = executor
        .execute(OWNER, ProxyRequest::get(server.url()))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::InvalidRequest(_)));
    mock.assert_async().await;
    assert!(log_entries(&stores).await.is_empty());
}

/// Request log that always fails
struct BrokenLogStore;

#[async_trait]
impl RequestLogStore for BrokenLogStore {
    async fn append(&self, _entry: &RequestLogEntry) -> StoreResult<()> {
        Err(StoreError::Invalid("log storage unavailable".to_string()))
    }

    async fn list(&self, _owner_id: &str, _limit: i64, _offset: i64) -> StoreResult<Vec<RequestLogEntry>> {
        Ok(Vec::new())
    }

    async fn summarize(&self, _owner_id: &str, _since: DateTime<Utc>) -> StoreResult<RequestLogSummary> {
        Ok(RequestLogSummary::default())
    }
}

#[tokio::test]
async fn test_log_failure_does_not_fail_the_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/").with_status(200).create_async().await;

    let stores = Stores::new().await;
    let credentials: Arc<dyn CredentialStore> = stores.credentials.clone();
    let rate_limits: Arc<dyn RateLimitStore> = stores.rate_limits.clone();
    let executor = ProxyExecutor::new(
        ProxyClient::new(test_proxy_config()).unwrap(),
        credentials,
        Arc::new(BrokenLogStore),
        rate_limits,
    );

    let result = executor.execute(OWNER, ProxyRequest::get(server.url())).await;
    tokio_test::assert_ok!(result);
    mock.assert_async().await;
}

/// Rate-limit store whose writes always fail
struct BrokenRateLimitStore;

#[async_trait]
impl RateLimitStore for BrokenRateLimitStore {
    async fn upsert(&self, _owner_id: &str, _api_name: &str, _fragment: &RateLimitFragment) -> StoreResult<RateLimitSnapshot> {
        Err(StoreError::Invalid("rate limit storage unavailable".to_string()))
    }

    async fn get(&self, _owner_id: &str, _api_name: &str) -> StoreResult<Option<RateLimitSnapshot>> {
        Ok(None)
    }

    async fn list(&self, _owner_id: &str) -> StoreResult<Vec<RateLimitSnapshot>> {
        Ok(Vec::new())
    }

    async fn delete(&self, _owner_id: &str, _api_name: &str) -> StoreResult<bool> {
        Ok(false)
    }
}

#[tokio::test]
async fn test_rate_limit_write_failure_does_not_fail_the_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/user")
        .with_status(200)
        .with_header("x-ratelimit-limit", "5000")
        .with_header("x-ratelimit-remaining", "4999")
        .create_async()
        .await;

    let stores = Stores::new().await;
    let key_id = create_key(&stores, "GitHub", "ghp_live_secret", None).await;
    let executor = ProxyExecutor::new(
        ProxyClient::new(test_proxy_config()).unwrap(),
        stores.credentials(),
        stores.logs(),
        Arc::new(BrokenRateLimitStore),
    );

    let result = executor
        .execute(
            OWNER,
            ProxyRequest::get(format!("{}/user", server.url())).with_api_key(key_id),
        )
        .await;
    let result = tokio_test::assert_ok!(result);
    assert_eq!(result.status_code, 200);
    mock.assert_async().await;

    let logs = log_entries(&stores).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 200);
}

/// Answers every lookup with fixed addresses, or fails when given none
struct StaticResolver(Vec<IpAddr>);

impl Resolve for StaticResolver {
    fn resolve(&self, _name: Name) -> Resolving {
        let addrs: Vec<SocketAddr> = self.0.iter().map(|ip| SocketAddr::new(*ip, 0)).collect();
        Box::pin(async move {
            if addrs.is_empty() {
                let err: Box<dyn std::error::Error + Send + Sync> = "no such host".into();
                return Err(err);
            }
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

fn resolving_executor(stores: &Stores, block_private_networks: bool, addrs: Vec<IpAddr>) -> ProxyExecutor {
    let config = test_proxy_config().with_block_private_networks(block_private_networks);
    let client = ProxyClient::with_resolver(config, Arc::new(StaticResolver(addrs))).unwrap();
    ProxyExecutor::new(client, stores.credentials(), stores.logs(), stores.rate_limits())
}

#[tokio::test]
async fn test_name_resolving_to_loopback_is_blocked_at_connect() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;
    let port = server.socket_address().port();

    let stores = Stores::new().await;
    let executor = resolving_executor(&stores, true, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);

    let err = executor
        .execute(OWNER, ProxyRequest::get(format!("http://api.public.test:{}/", port)))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::InvalidRequest(_)), "got {:?}", err);
    mock.assert_async().await;
    assert!(log_entries(&stores).await.is_empty());
}

#[tokio::test]
async fn test_resolver_answers_are_used_when_filtering_is_off() {
    let mut server = mockito::Server::new_async().await;
    let mock = server.mock("GET", "/ping").with_status(200).create_async().await;
    let port = server.socket_address().port();

    let stores = Stores::new().await;
    let executor = resolving_executor(&stores, false, vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);

    let result = executor
        .execute(OWNER, ProxyRequest::get(format!("http://api.public.test:{}/ping", port)))
        .await
        .unwrap();

    assert_eq!(result.status_code, 200);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_resolution_failure_is_logged_as_network_error() {
    let stores = Stores::new().await;
    let executor = resolving_executor(&stores, true, Vec::new());

    let err = executor
        .execute(OWNER, ProxyRequest::get("http://unknown.public.test/"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Network(_)), "got {:?}", err);
    let logs = log_entries(&stores).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 502);
}
