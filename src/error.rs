//! Error types for the database administration backend.
//!
//! This module defines the database and AI error taxonomies using `thiserror`.
//! Each variant carries a human-readable message suitable for showing to an
//! end user; driver failures are prefixed with the operation that failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// A physical connection could not be opened or probed.
    #[error("{message}")]
    Connection { message: String, suggestion: String },

    /// The driver rejected a statement or metadata call.
    #[error("{message}")]
    Database {
        message: String,
        /// e.g., "42S02" for an unknown table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// The session id is unknown or its connection has been closed.
    #[error("Connection not found or closed")]
    ConnectionNotFound { session_id: String },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Wrap a driver error with the name of the operation that produced it.
    ///
    /// The resulting message reads `"<operation>: <driver message>"`.
    pub fn driver(operation: &str, err: sqlx::Error) -> Self {
        let (message, sql_state) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.message().to_string(),
                db_err.code().map(|c| c.to_string()),
            ),
            other => (other.to_string(), None),
        };

        let suggestion = match &err {
            sqlx::Error::Database(_) => "Check the SQL syntax and referenced objects",
            sqlx::Error::Io(_) | sqlx::Error::Protocol(_) => {
                "Check network connectivity and database server status, then reconnect"
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                "A value could not be decoded; try casting the column to text"
            }
            _ => "Retry the operation or reconnect the session",
        };

        Self::database(format!("{}: {}", operation, message), sql_state, suggestion)
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a connection not found error.
    pub fn connection_not_found(session_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::ConnectionNotFound { .. } => Some("Reconnect to obtain a new session id"),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Failures of the AI assistant layer.
#[derive(Error, Debug)]
pub enum AiError {
    /// The selected configuration is disabled or has no API key.
    #[error("AI service is not configured or disabled")]
    Disabled,

    #[error("no available AI configuration")]
    NoConfig,

    #[error("AI configuration '{id}' not found")]
    ConfigNotFound { id: String },

    #[error("Role '{id}' not found")]
    RoleNotFound { id: String },

    #[error("Preset roles cannot be deleted")]
    PresetRole { id: String },

    #[error("API authentication failed, check the API key")]
    Authentication,

    #[error("API access denied, check permissions or quota")]
    AccessDenied,

    #[error("API rate limit exceeded, try again later")]
    RateLimited,

    #[error("Cannot reach the AI service, check the network or base URL")]
    Unreachable,

    #[error("Unexpected response from AI service: {message}")]
    UnexpectedResponse { message: String },

    /// Non-success status not covered by a dedicated category.
    #[error("AI service returned an error: {status} - {body}")]
    Upstream { status: u16, body: String },

    #[error("AI request failed: {message}")]
    Request { message: String },

    #[error("{message}")]
    InvalidInput { message: String },
}

impl AiError {
    /// Map a non-success upstream status to its user-facing category.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::AccessDenied,
            429 => Self::RateLimited,
            _ => Self::Upstream {
                status,
                body: body.into(),
            },
        }
    }

    pub fn unexpected_response(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            message: message.into(),
        }
    }

    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            return Self::Unreachable;
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return Self::unexpected_response(err.to_string());
        }
        Self::request(err.to_string())
    }
}

/// Result type alias for AI operations.
pub type AiResult<T> = Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_not_found_message() {
        let err = DbError::connection_not_found("abc");
        assert_eq!(err.to_string(), "Connection not found or closed");
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_driver_error_carries_operation_prefix() {
        let err = DbError::driver("Failed to get tables", sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("Failed to get tables: "));
        assert!(matches!(err, DbError::Database { sql_state: None, .. }));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42000".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::invalid_input("x").suggestion(), None);
    }

    #[test]
    fn test_invalid_input_display_is_bare_message() {
        let err = DbError::invalid_input("sessionId and sql are required");
        assert_eq!(err.to_string(), "sessionId and sql are required");
    }

    #[test]
    fn test_timeout_display() {
        let err = DbError::timeout("connect", 10);
        assert_eq!(err.to_string(), "Timeout: connect exceeded 10s");
    }

    #[test]
    fn test_ai_status_categories() {
        assert!(matches!(AiError::from_status(401, ""), AiError::Authentication));
        assert!(matches!(AiError::from_status(403, ""), AiError::AccessDenied));
        assert!(matches!(AiError::from_status(429, ""), AiError::RateLimited));
        let err = AiError::from_status(500, "boom");
        assert_eq!(err.to_string(), "AI service returned an error: 500 - boom");
    }

    #[test]
    fn test_ai_fallback_message() {
        assert_eq!(AiError::NoConfig.to_string(), "no available AI configuration");
        assert_eq!(
            AiError::Disabled.to_string(),
            "AI service is not configured or disabled"
        );
    }
}
