//! # Request proxy
//!
//! Forwards ad-hoc HTTP requests on behalf of a dashboard user:
//! - url, method and destination validation
//! - credential injection from the key store
//! - bounded single-attempt outbound call
//! - request logging and rate-limit header extraction

pub mod client;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod model;
pub mod validate;

pub use client::{ProxyClient, ProxyMetrics};
pub use error::ProxyError;
pub use executor::ProxyExecutor;
pub use extractor::extract_rate_limit;
pub use model::{HttpMethod, ProxyRequest, ProxyResult, ResponseBody};
