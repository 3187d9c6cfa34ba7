//! HTTP API.
//!
//! Three route groups are nested under `/api`:
//! - `/api/connections`: session lifecycle
//! - `/api/sql`: statement execution and metadata
//! - `/api/ai`: AI assistant, configurations and roles

pub mod ai;
pub mod connections;
pub mod error;
pub mod extract;
pub mod sql;

use crate::ai::AiService;
use crate::db::{QueryEngine, SchemaInspector, SessionRegistry};
use axum::Router;

pub use error::{ApiResult, AppError};
pub use extract::{ApiJson, ApiQuery};

/// Shared handler state. Cloning is cheap; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub engine: QueryEngine,
    pub inspector: SchemaInspector,
    pub ai: AiService,
}

impl AppState {
    pub fn new(registry: SessionRegistry, ai: AiService) -> Self {
        Self {
            engine: QueryEngine::new(registry.clone()),
            inspector: SchemaInspector::new(registry.clone()),
            registry,
            ai,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/connections", connections::routes())
        .nest("/api/sql", sql::routes())
        .nest("/api/ai", ai::routes())
        .with_state(state)
}
