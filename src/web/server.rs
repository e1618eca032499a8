use anyhow::{Context, Result};
use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::dao::{init_db, init_sqlite_pool};
use crate::web::{
    AppState,
    handlers::{
        api_key_handler::{create_api_key, delete_api_key, get_api_key, list_api_keys, update_api_key},
        dashboard_handler::get_dashboard_stats,
        health_handler::health_check,
        proxy_handler::proxy_request,
        rate_limit_handler::{
            create_rate_limit, delete_rate_limit, get_rate_limit, list_rate_limits, update_rate_limit,
        },
        request_log_handler::list_request_logs,
    },
    middleware::cors::cors_layer,
};

pub struct WebServer {
    config: AppConfig,
}

impl WebServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        info!(database_url = %self.config.database_url, "Initializing database");
        let pool = init_sqlite_pool(&self.config.database_url)
            .await
            .with_context(|| format!("failed to open database {}", self.config.database_url))?;
        init_db(&pool).await.context("failed to apply database schema")?;

        let state = AppState::from_pool(pool, &self.config)?;
        let app = create_app(state, &self.config.allowed_origins);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", self.config.bind_addr))?;
        info!(addr = %self.config.bind_addr, "API dashboard listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// Full router: `/health` plus the owner-scoped `/api` routes
pub fn create_app(state: AppState, allowed_origins: &[String]) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        // API keys
        .route("/keys", get(list_api_keys).post(create_api_key))
        .route("/keys/:id", get(get_api_key).put(update_api_key).delete(delete_api_key))
        // Proxy
        .route("/proxy", post(proxy_request))
        // Request history
        .route("/request-logs", get(list_request_logs))
        // Rate limits
        .route("/rate-limits", get(list_rate_limits).post(create_rate_limit))
        .route(
            "/rate-limits/:api_name",
            get(get_rate_limit).put(update_rate_limit).delete(delete_rate_limit),
        )
        // Dashboard
        .route("/dashboard/stats", get(get_dashboard_stats));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
