//! Connection-related data models.
//!
//! This module defines the descriptor used to open a session and the
//! password-free summary returned when sessions are listed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Includes MariaDB
    #[default]
    #[serde(alias = "MySQL", alias = "MYSQL", alias = "mariadb")]
    MySQL,
    #[serde(alias = "SQLite", alias = "SQLITE")]
    SQLite,
}

impl DatabaseType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// TLS mode requested for a connection.
///
/// Only `REQUIRED` enables TLS; every other value connects in plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TlsMode {
    #[serde(alias = "required")]
    Required,
    #[default]
    #[serde(alias = "disabled")]
    Disabled,
    #[serde(other)]
    Other,
}

impl TlsMode {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

/// Descriptor used to open a session.
///
/// For SQLite, `database` holds the file path (or `:memory:`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Empty or absent means "no default schema"
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: String,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: TlsMode,
    #[serde(default)]
    pub db_type: DatabaseType,
}

impl ConnectionInfo {
    /// Create a MySQL descriptor.
    pub fn mysql(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: String::new(),
            host: host.into(),
            port,
            database: None,
            username: username.into(),
            password: password.into(),
            ssl_mode: TlsMode::Disabled,
            db_type: DatabaseType::MySQL,
        }
    }

    /// Create a SQLite descriptor for a file path or `:memory:`.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            host: String::new(),
            port: 0,
            database: Some(path.into()),
            username: String::new(),
            password: String::new(),
            ssl_mode: TlsMode::Disabled,
            db_type: DatabaseType::SQLite,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the TLS mode.
    pub fn with_ssl_mode(mut self, ssl_mode: TlsMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// The default database, treating an empty string as absent.
    pub fn database_name(&self) -> Option<&str> {
        self.database.as_deref().filter(|d| !d.trim().is_empty())
    }

    /// Check the fields required to open a connection.
    pub fn validate(&self) -> Result<(), ConnectionInfoError> {
        match self.db_type {
            DatabaseType::MySQL => {
                if self.host.trim().is_empty() {
                    return Err(ConnectionInfoError::MissingHost);
                }
                if self.port == 0 {
                    return Err(ConnectionInfoError::InvalidPort);
                }
                if self.username.trim().is_empty() {
                    return Err(ConnectionInfoError::MissingUsername);
                }
            }
            DatabaseType::SQLite => {
                if self.database_name().is_none() {
                    return Err(ConnectionInfoError::MissingPath);
                }
            }
        }
        Ok(())
    }

    /// A log- and display-safe target description (no credentials).
    pub fn target(&self) -> String {
        match self.db_type {
            DatabaseType::MySQL => format!(
                "{}@{}:{}/{}",
                self.username,
                self.host,
                self.port,
                self.database_name().unwrap_or("")
            ),
            DatabaseType::SQLite => self.database_name().unwrap_or("").to_string(),
        }
    }
}

/// Errors found while validating a [`ConnectionInfo`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionInfoError {
    #[error("host is required")]
    MissingHost,

    #[error("port must be greater than 0")]
    InvalidPort,

    #[error("username is required")]
    MissingUsername,

    #[error("database file path is required for SQLite")]
    MissingPath,
}

/// Session summary returned by the session listing (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub db_type: DatabaseType,
    pub connected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults_to_mysql() {
        let info: ConnectionInfo = serde_json::from_str(
            r#"{"name":"local","host":"db","username":"root","password":"pw","sslMode":"REQUIRED"}"#,
        )
        .unwrap();
        assert_eq!(info.db_type, DatabaseType::MySQL);
        assert_eq!(info.port, DEFAULT_MYSQL_PORT);
        assert!(info.ssl_mode.is_required());
        assert!(info.validate().is_ok());
    }

    #[test]
    fn test_unknown_ssl_mode_is_not_required() {
        let info: ConnectionInfo =
            serde_json::from_str(r#"{"host":"db","username":"u","sslMode":"PREFERRED"}"#).unwrap();
        assert_eq!(info.ssl_mode, TlsMode::Other);
        assert!(!info.ssl_mode.is_required());
    }

    #[test]
    fn test_password_is_never_serialized() {
        let info = ConnectionInfo::mysql("db", 3306, "root", "secret");
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("secret"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_empty_database_is_absent() {
        let info = ConnectionInfo::mysql("db", 3306, "root", "").with_database("  ");
        assert_eq!(info.database_name(), None);
        assert_eq!(info.target(), "root@db:3306/");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let info = ConnectionInfo::mysql("", 3306, "root", "");
        assert!(matches!(
            info.validate(),
            Err(ConnectionInfoError::MissingHost)
        ));

        let mut sqlite = ConnectionInfo::sqlite(":memory:");
        assert!(sqlite.validate().is_ok());
        sqlite.database = None;
        assert!(matches!(
            sqlite.validate(),
            Err(ConnectionInfoError::MissingPath)
        ));
    }

    #[test]
    fn test_database_type_display() {
        assert_eq!(DatabaseType::MySQL.to_string(), "MySQL");
        assert_eq!(DatabaseType::SQLite.to_string(), "SQLite");
        let t: DatabaseType = serde_json::from_str(r#""sqlite""#).unwrap();
        assert_eq!(t, DatabaseType::SQLite);
    }
}
