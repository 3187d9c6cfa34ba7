//! Database administration backend.
//!
//! Session-based MySQL/SQLite connections with paginated query execution,
//! transaction control and schema introspection, plus an AI assistant backed
//! by OpenAI-compatible providers, served over an axum HTTP API.

pub mod ai;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod server;

pub use config::Config;
pub use error::{AiError, DbError};
pub use server::HttpServer;
