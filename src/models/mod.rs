//! Data models for the database administration backend.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    ConnectionInfo, ConnectionInfoError, DEFAULT_MYSQL_PORT, DatabaseType, SessionSummary, TlsMode,
};
pub use query::{
    ExecuteOutcome, JsonRow, MutationResult, QueryResult, TransactionCommand, TransactionOutcome,
};
pub use schema::{ColumnDefinition, IndexInfo, TableSchema, group_index_rows};
