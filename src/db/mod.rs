//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - One exclusively-owned connection per session
//! - The session registry
//! - Statement classification and pagination helpers
//! - Query execution and transaction control
//! - Schema introspection
//! - Row to JSON type mappings

pub mod connection;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod schema;
pub mod session;
pub mod statement;
pub mod types;

pub use connection::{Backend, DbConnection};
pub use executor::{PageRequest, QueryEngine};
pub use schema::SchemaInspector;
pub use session::{Session, SessionRegistry};
pub use statement::StatementKind;
