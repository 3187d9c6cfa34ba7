//! HTTP server lifecycle.
//!
//! Binds the listener, serves the API with CORS, and on SIGINT/SIGTERM stops
//! accepting requests and closes every open session.

use crate::api::{self, AppState};
use crate::db::SessionRegistry;
use crate::error::{DbError, DbResult};
use axum::http::{HeaderValue, Method, header};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

/// Open SSE streams may hold the server open; shutdown is forced after this.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpServer {
    state: AppState,
    host: String,
    port: u16,
    cors_origin: Option<String>,
}

impl HttpServer {
    pub fn new(state: AppState, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
            cors_origin: None,
        }
    }

    /// Allow browser requests from `origin`. An empty string disables CORS.
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        self.cors_origin = (!origin.trim().is_empty()).then_some(origin);
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn registry(&self) -> &SessionRegistry {
        &self.state.registry
    }

    /// The API router with the configured CORS layer applied.
    pub fn app(&self) -> DbResult<axum::Router> {
        let router = api::router(self.state.clone());
        match &self.cors_origin {
            Some(origin) => Ok(router.layer(cors_layer(origin)?)),
            None => Ok(router),
        }
    }

    pub async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        let app = self.app()?;

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;
        info!(address = %bind_addr, "HTTP server listening");

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        self.registry().close_all().await;
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for connections to close (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!(sessions = self.registry().len().await, "Closing database sessions");
        self.registry().close_all().await;

        Ok(())
    }
}

fn cors_layer(origin: &str) -> DbResult<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| DbError::invalid_input(format!("Invalid CORS origin '{}': {}", origin, e)))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiClient, AiConfigStore, AiService, RoleRegistry};

    fn state() -> AppState {
        let ai = AiService::new(
            AiClient::new(Duration::from_secs(5)).unwrap(),
            AiConfigStore::new(),
            RoleRegistry::with_presets(),
            Duration::from_secs(5),
        );
        AppState::new(SessionRegistry::default(), ai)
    }

    #[test]
    fn test_bind_addr() {
        let server = HttpServer::new(state(), "0.0.0.0", 3000);
        assert_eq!(server.bind_addr(), "0.0.0.0:3000");
    }

    #[test]
    fn test_cors_origin() {
        let server = HttpServer::new(state(), "127.0.0.1", 8080).with_cors_origin("");
        assert!(server.cors_origin.is_none());
        assert!(server.app().is_ok());

        let server = server.with_cors_origin("http://localhost:3000");
        assert!(server.app().is_ok());

        let server = server.with_cors_origin("bad\norigin");
        assert!(matches!(server.app(), Err(DbError::InvalidInput { .. })));
    }
}
