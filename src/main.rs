//! dbadmin-server - Main entry point.

use clap::Parser;
use dbadmin_server::ai::{AiClient, AiConfigStore, AiService, RoleRegistry};
use dbadmin_server::api::AppState;
use dbadmin_server::config::Config;
use dbadmin_server::db::SessionRegistry;
use dbadmin_server::server::HttpServer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        address = %config.http_bind_addr(),
        "Starting dbadmin-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = SessionRegistry::new(config.connect_timeout_duration());
    let ai = AiService::new(
        AiClient::new(config.ai_timeout_duration())?,
        AiConfigStore::new(),
        RoleRegistry::with_presets(),
        config.stream_idle_timeout_duration(),
    );
    let state = AppState::new(registry, ai);

    let server = HttpServer::new(state, &config.http_host, config.http_port)
        .with_cors_origin(&config.cors_origin);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
