//! # HTTP API
//!
//! axum routes for keys, the proxy, request history, rate limits and dashboard stats

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;

pub use middleware::OwnerId;
pub use server::{WebServer, create_app};
pub use state::AppState;
