use anyhow::Result;
use tracing::{info, warn};

use api_dashboard::config::AppConfig;
use api_dashboard::logger::init_logger;
use api_dashboard::web::WebServer;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    //*
    //* Initialize logger; the guard flushes file output on exit
    //*
    let _log_guard = init_logger(config.log.clone())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_addr = %config.bind_addr,
        block_private_networks = config.proxy.block_private_networks,
        "Starting API dashboard backend"
    );
    if config.uses_development_key() {
        warn!("ENCRYPTION_KEY not set, secrets are sealed with the development key");
    }
    if config.expose_secrets {
        warn!("EXPOSE_SECRETS is on, key endpoints return plaintext secrets");
    }

    //*
    //* Serve until ctrl-c
    //*
    WebServer::new(config).start().await
}
